//! Templated HTTP dispatch — one [`Hook`] implementation.

mod template;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::error::{Result, WebhookError};
use crate::session::{Hook, Transaction};

pub use template::Template;

/// JSON payload content type.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Default per-delivery timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifier of a registered webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(Uuid);

impl WebhookId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Validated webhook configuration.
///
/// All fields except `endpoint` are optional; leaving `method` unset derives
/// it from the presence of a body schema (schema present ⇒ POST, GET
/// otherwise).
#[derive(Default)]
pub struct WebhookConfig {
    pub endpoint: String,
    pub method: Option<Method>,
    pub auth: Option<String>,
    /// Body template source plus the content type it renders.
    pub schema: Option<(String, String)>,
    /// Fixed id; a fresh v4 is generated when unset.
    pub id: Option<Uuid>,
    pub timeout: Option<Duration>,
}

impl WebhookConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }
}

/// Serializable description of a webhook, sufficient to reconstruct it.
///
/// Empty strings mean "not set". [`Webhook::from_blueprint`] followed by
/// [`Webhook::to_blueprint`] reproduces every field that was set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub id: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub content_type: String,
}

/// Delivers transactions to an HTTP endpoint, optionally rendering a
/// templated body.
pub struct Webhook {
    id: WebhookId,
    endpoint: String,
    method: Method,
    headers: HeaderMap,
    schema: Option<Template>,
    timeout: Duration,
    client: reqwest::Client,
}

impl Webhook {
    /// Builds a webhook from a validated configuration.
    ///
    /// # Errors
    /// - [`WebhookError::EmptyEndpoint`] when no endpoint is given
    /// - [`WebhookError::TemplateCompile`] when the schema does not compile
    /// - [`WebhookError::InvalidHeader`] when auth or content type are not
    ///   valid header values
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(WebhookError::EmptyEndpoint.into());
        }

        let mut headers = HeaderMap::new();
        let schema = match &config.schema {
            Some((source, content_type)) => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_str(content_type)
                        .map_err(|_| WebhookError::InvalidHeader { name: "Content-Type" })?,
                );
                Some(Template::compile(source)?)
            }
            None => None,
        };
        if let Some(token) = &config.auth {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(token)
                    .map_err(|_| WebhookError::InvalidHeader { name: "Authorization" })?,
            );
        }

        let method = match config.method {
            Some(method) => method,
            None if schema.is_some() => Method::POST,
            None => Method::GET,
        };

        Ok(Self {
            id: WebhookId(config.id.unwrap_or_else(Uuid::new_v4)),
            endpoint: config.endpoint,
            method,
            headers,
            schema,
            timeout: config.timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
            client: reqwest::Client::new(),
        })
    }

    /// Builds a webhook from its serialized description.
    pub fn from_blueprint(bp: &Blueprint) -> Result<Self> {
        if bp.endpoint.is_empty() {
            return Err(WebhookError::EmptyEndpoint.into());
        }

        let mut config = WebhookConfig::new(&bp.endpoint);
        if !bp.id.is_empty() {
            let id = Uuid::parse_str(&bp.id)
                .map_err(|_| WebhookError::InvalidId(bp.id.clone()))?;
            config.id = Some(id);
        }
        if !bp.schema.is_empty() {
            config.schema = Some((bp.schema.clone(), bp.content_type.clone()));
        }
        if !bp.auth.is_empty() {
            config.auth = Some(bp.auth.clone());
        }
        if !bp.method.is_empty() {
            let method = Method::from_bytes(bp.method.as_bytes())
                .map_err(|_| WebhookError::InvalidMethod(bp.method.clone()))?;
            config.method = Some(method);
        }
        Self::new(config)
    }

    /// Serializes the webhook back into a [`Blueprint`].
    pub fn to_blueprint(&self) -> Blueprint {
        Blueprint {
            id: self.id.to_string(),
            endpoint: self.endpoint.clone(),
            method: self.method.to_string(),
            auth: header_str(&self.headers, AUTHORIZATION),
            schema: self
                .schema
                .as_ref()
                .map(|t| t.source().to_string())
                .unwrap_or_default(),
            content_type: header_str(&self.headers, CONTENT_TYPE),
        }
    }

    pub fn id(&self) -> WebhookId {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Builds the outbound request for a transaction: configured method and
    /// headers, with the rendered template (if any) as the body.
    pub fn prepare_request(&self, tx: &Transaction) -> Result<reqwest::Request> {
        let mut builder = self
            .client
            .request(self.method.clone(), self.endpoint.as_str())
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if let Some(template) = &self.schema {
            builder = builder.body(template.render(tx)?);
        }
        Ok(builder
            .build()
            .map_err(|e| WebhookError::Request(e.to_string()))?)
    }

    async fn dispatch(&self, tx: &Transaction) -> Result<()> {
        let request = self.prepare_request(tx)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            error!(
                id = %tx.id(),
                webhook = %self.id,
                endpoint = %self.endpoint,
                method = %self.method,
                status = %status,
                "endpoint responded with an error status"
            );
            // The response body never travels upstream.
            return Err(WebhookError::Status {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Hook for Webhook {
    async fn send(&self, tx: &Transaction) -> Result<()> {
        self.dispatch(tx).await
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

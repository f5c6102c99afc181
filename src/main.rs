use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use mailway::config::Config;
use mailway::forward::Forwarder;
use mailway::http::{ApiState, management_routes};
use mailway::mailbox::{Mailbox, MailboxConfig};
use mailway::session::Hook;
use mailway::smtp::SmtpServer;
use mailway::spam::RcptMismatch;
use mailway::store::{KnownRecipient, LibSqlBackend, Registry, RegistryHooks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let registry: Arc<dyn Registry> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    let mut hooks: Vec<Arc<dyn Hook>> = Vec::new();
    if let Some(forward) = Config::forwarder_from_env() {
        info!(host = %forward.host, "SMTP forwarding enabled");
        hooks.push(Arc::new(Forwarder::new(forward)?));
    }

    let mailbox = Mailbox::new(MailboxConfig {
        filters: vec![
            Arc::new(RcptMismatch),
            Arc::new(KnownRecipient::new(Arc::clone(&registry))),
        ],
        hooks,
        hook_sets: vec![Arc::new(RegistryHooks::new(Arc::clone(&registry)))],
        timeout: config.commit_timeout,
        ..MailboxConfig::default()
    });

    let smtp_listener = TcpListener::bind(config.smtp_addr).await?;
    info!(addr = %config.smtp_addr, domain = %config.domain, "listening for SMTP");
    let smtp = SmtpServer::new(mailbox, &config.domain).serve(smtp_listener);

    let api = management_routes(ApiState {
        registry,
        domain: config.domain.clone(),
    });
    let http_listener = TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "serving management API");

    tokio::select! {
        result = smtp => result?,
        result = async move { axum::serve(http_listener, api).await } => result?,
    }
    Ok(())
}

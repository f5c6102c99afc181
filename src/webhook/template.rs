//! Payload template mini-language.
//!
//! Templates interpolate transaction fields into otherwise literal text:
//!
//! ```text
//! {"msg": "{{.Text}}", "subject": "{{Limit 80 .Subject}}"}
//! ```
//!
//! An action is either a field reference (`{{.Text}}`) or a helper call in
//! prefix form (`{{Limit 10 .Text}}`, `{{Escape .Subject}}`). Templates are
//! compiled once at webhook construction and rendered per delivery.

use std::fmt;

use crate::error::WebhookError;
use crate::session::Transaction;

/// Transaction fields exposed to templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SenderAddress,
    RcptAddress,
    Subject,
    Text,
    Html,
    From,
    To,
}

impl Field {
    fn lookup(name: &str) -> Option<Field> {
        match name {
            "SenderAddress" => Some(Field::SenderAddress),
            "RcptAddress" => Some(Field::RcptAddress),
            "Subject" => Some(Field::Subject),
            "Text" => Some(Field::Text),
            "HTML" => Some(Field::Html),
            "From" => Some(Field::From),
            "To" => Some(Field::To),
            _ => None,
        }
    }

    fn resolve(self, tx: &Transaction) -> String {
        match self {
            Field::SenderAddress => tx.sender_address(),
            Field::RcptAddress => tx.rcpt_address(),
            Field::Subject => tx.subject().to_string(),
            Field::Text => tx.text().to_string(),
            Field::Html => tx.html().to_string(),
            Field::From => tx.from().to_string(),
            Field::To => tx.to().to_string(),
        }
    }
}

/// Helper functions callable from templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    /// `Limit n s` — truncate `s` to at most `n` characters.
    Limit,
    /// `Escape s` — escaped representation of `s` with the surrounding
    /// quotes stripped, safe inside a JSON string literal.
    Escape,
}

impl Helper {
    fn lookup(name: &str) -> Option<Helper> {
        match name {
            "Limit" => Some(Helper::Limit),
            "Escape" => Some(Helper::Escape),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Arg {
    Int(i64),
    Field(Field),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(Field),
    Call { helper: Helper, args: Vec<Arg> },
}

/// A compiled payload template.
#[derive(Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `source`, validating field names, helper names, and helper
    /// arity up front.
    pub fn compile(source: &str) -> Result<Self, WebhookError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                WebhookError::TemplateCompile("unterminated '{{' action".to_string())
            })?;
            segments.push(parse_action(after[..close].trim())?);
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template against a transaction.
    pub fn render(&self, tx: &Transaction) -> Result<String, WebhookError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&field.resolve(tx)),
                Segment::Call { helper, args } => out.push_str(&call(*helper, args, tx)?),
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .finish()
    }
}

fn parse_action(action: &str) -> Result<Segment, WebhookError> {
    let mut words = action.split_whitespace();
    let head = words.next().ok_or_else(|| {
        WebhookError::TemplateCompile("empty '{{ }}' action".to_string())
    })?;

    if let Some(name) = head.strip_prefix('.') {
        if words.next().is_some() {
            return Err(WebhookError::TemplateCompile(format!(
                "unexpected arguments after field '.{name}'"
            )));
        }
        let field = Field::lookup(name).ok_or_else(|| {
            WebhookError::TemplateCompile(format!("unknown field '.{name}'"))
        })?;
        return Ok(Segment::Field(field));
    }

    let helper = Helper::lookup(head).ok_or_else(|| {
        WebhookError::TemplateCompile(format!("unknown helper '{head}'"))
    })?;
    let args = words.map(parse_arg).collect::<Result<Vec<_>, _>>()?;

    let arity_ok = match helper {
        Helper::Limit => args.len() == 2,
        Helper::Escape => args.len() == 1,
    };
    if !arity_ok {
        return Err(WebhookError::TemplateCompile(format!(
            "wrong number of arguments for '{head}'"
        )));
    }

    Ok(Segment::Call { helper, args })
}

fn parse_arg(word: &str) -> Result<Arg, WebhookError> {
    if let Some(name) = word.strip_prefix('.') {
        let field = Field::lookup(name).ok_or_else(|| {
            WebhookError::TemplateCompile(format!("unknown field '.{name}'"))
        })?;
        return Ok(Arg::Field(field));
    }
    word.parse::<i64>().map(Arg::Int).map_err(|_| {
        WebhookError::TemplateCompile(format!("invalid argument '{word}'"))
    })
}

fn call(helper: Helper, args: &[Arg], tx: &Transaction) -> Result<String, WebhookError> {
    match helper {
        Helper::Limit => {
            let max = match &args[0] {
                Arg::Int(n) if *n >= 0 => *n as usize,
                Arg::Int(n) => {
                    return Err(WebhookError::TemplateRender(format!(
                        "Limit count must not be negative, got {n}"
                    )));
                }
                Arg::Field(_) => {
                    return Err(WebhookError::TemplateRender(
                        "Limit count must be an integer".to_string(),
                    ));
                }
            };
            let text = resolve_string(&args[1], tx)?;
            Ok(limit(max, &text))
        }
        Helper::Escape => {
            let text = resolve_string(&args[0], tx)?;
            Ok(escape(&text))
        }
    }
}

fn resolve_string(arg: &Arg, tx: &Transaction) -> Result<String, WebhookError> {
    match arg {
        Arg::Field(field) => Ok(field.resolve(tx)),
        Arg::Int(n) => Err(WebhookError::TemplateRender(format!(
            "expected a field argument, got integer {n}"
        ))),
    }
}

/// Truncates `s` to at most `max` characters.
fn limit(max: usize, s: &str) -> String {
    s.chars().take(max).collect()
}

/// Escaped representation of `s` with the surrounding quotes stripped.
///
/// Inner quotes and control characters come out backslash-escaped, which
/// keeps the result safe to embed inside a JSON string literal.
fn escape(s: &str) -> String {
    let quoted = format!("{s:?}");
    quoted
        .strip_prefix('"')
        .and_then(|q| q.strip_suffix('"'))
        .unwrap_or(&quoted)
        .to_string()
}

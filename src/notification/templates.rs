//! Built-in markdown message templates.
//!
//! Templates use `{name}` placeholders filled from a JSON object. There is no
//! escaping and no conditional logic; every placeholder must be supplied.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

const ORDER_FILLED: &str = "### 委托成交\n\
- **股票**: {code}\n\
- **方向**: {direction}\n\
- **价格**: {price}\n\
- **数量**: {volume}\n\
- **时间**: {timestamp}";

const RISK_ALERT: &str = "### 风控预警\n\
- **类型**: {risk_type}\n\
- **级别**: {severity}\n\
- **详情**: {message}\n\
- **时间**: {timestamp}";

const DAILY_BRIEFING: &str = "### 每日投资晨报 ({date})\n\n{summary}";

const SYSTEM_ERROR: &str = "### 系统异常\n\
- **错误**: {error}\n\
- **堆栈**: {traceback}\n\
- **时间**: {timestamp}";

/// Registered template names and their bodies.
pub const TEMPLATES: &[(&str, &str)] = &[
    ("order_filled", ORDER_FILLED),
    ("risk_alert", RISK_ALERT),
    ("daily_briefing", DAILY_BRIEFING),
    ("system_error", SYSTEM_ERROR),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("template '{template}' requires variable '{variable}'")]
    MissingVariable { template: String, variable: String },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid"))
}

/// The raw body of a registered template.
pub fn template(name: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, body)| *body)
}

/// Placeholder names used by a template, in order of appearance.
pub fn variables(name: &str) -> Result<Vec<&'static str>, TemplateError> {
    let body = template(name).ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;
    Ok(placeholder()
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders the template `name` with values from `vars`.
///
/// `vars` is normally built with `serde_json::json!`. Extra keys are ignored.
///
/// # Errors
/// * [`TemplateError::UnknownTemplate`] if no template has that name
/// * [`TemplateError::MissingVariable`] for the first placeholder with no value
pub fn render_template(name: &str, vars: &Value) -> Result<String, TemplateError> {
    let body = template(name).ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;

    let mut out = String::with_capacity(body.len() + 64);
    let mut last = 0;
    for caps in placeholder().captures_iter(body) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = vars.get(key.as_str()).ok_or_else(|| TemplateError::MissingVariable {
            template: name.to_string(),
            variable: key.as_str().to_string(),
        })?;
        out.push_str(&body[last..whole.start()]);
        out.push_str(&display_value(value));
        last = whole.end();
    }
    out.push_str(&body[last..]);
    Ok(out)
}

/// A notification body: either literal text or a template to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Template { name: String, vars: Value },
}

impl Message {
    pub fn template(name: impl Into<String>, vars: Value) -> Self {
        Message::Template {
            name: name.into(),
            vars,
        }
    }

    pub fn render(&self) -> Result<String, TemplateError> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Template { name, vars } => render_template(name, vars),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

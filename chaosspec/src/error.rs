//! Harness error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{component} not started")]
    NotStarted { component: &'static str },

    #[error("Proxy \"{name}\" not found. {}", available_proxies(.available))]
    ProxyNotFound { name: String, available: Vec<String> },

    #[error("Proxy admin request failed ({}): {message}", status_label(.status))]
    AdminError { status: Option<u16>, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Container runtime command `{command}` failed: {message}")]
    RuntimeError { command: String, message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Port {port} is not exposed by service {service}")]
    PortNotExposed { service: String, port: u16 },

    #[error("Operation not supported by the proxy admin: {operation}")]
    Unsupported { operation: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    pub fn not_started(component: &'static str) -> Self {
        HarnessError::NotStarted { component }
    }

    pub fn runtime<C: Into<String>, M: Into<String>>(command: C, message: M) -> Self {
        HarnessError::RuntimeError {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn config<F: Into<String>, V: ToString>(field: F, value: V) -> Self {
        HarnessError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

fn available_proxies(available: &[String]) -> String {
    if available.is_empty() {
        "No proxies exist yet.".to_string()
    } else {
        format!("Available: {}", available.join(", "))
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no response".to_string(),
    }
}

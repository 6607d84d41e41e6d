use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Uniform descriptor for a failed backend call, whatever shape the failure
/// arrived in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetails {
    pub message: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub code: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub response_data: Option<Value>,
    pub sql: Option<String>,
}

impl fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiErrorDetails {}

/// Structured transport failure a [`DatabaseClient`] implementation can
/// return through `anyhow`. `response_data` carries whatever the backend put
/// in the reply body, verbatim.
///
/// [`DatabaseClient`]: crate::services::database::DatabaseClient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendError {
    pub message: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub code: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub response_data: Option<Value>,
    pub sql: Option<String>,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

const MESSAGE_FIELDS: [&str; 4] = ["message", "error", "detail", "msg"];
const ENGINE_ERROR_FIELDS: [&str; 3] = ["error", "cause", "engine_error"];

/// Normalize an arbitrary backend failure into [`ApiErrorDetails`].
///
/// Never fails and always produces a non-empty message.
pub fn extract_api_error_details(err: &anyhow::Error) -> ApiErrorDetails {
    let mut details = match err.downcast_ref::<BackendError>() {
        Some(backend) => ApiErrorDetails {
            message: backend.message.clone(),
            status: backend.status,
            status_text: backend.status_text.clone(),
            code: backend.code.clone(),
            url: backend.url.clone(),
            method: backend.method.as_deref().map(str::to_uppercase),
            response_data: backend.response_data.clone().map(parse_embedded_json),
            sql: backend.sql.clone(),
        },
        None => ApiErrorDetails {
            message: format!("{err:#}"),
            ..Default::default()
        },
    };

    details.message = resolve_message(&details);

    if details.message.contains("{\"extended_context\"") {
        details.message = clean_extended_context(&details.message);
    }

    if details.message.trim().is_empty() {
        details.message = fallback_message(details.status).to_string();
    }

    details
}

/// Backends sometimes double-encode the reply body. A string that parses as
/// JSON is unwrapped; anything else is kept as-is.
fn parse_embedded_json(data: Value) -> Value {
    match &data {
        Value::String(s) => {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(s).unwrap_or(data)
            } else {
                data
            }
        }
        _ => data,
    }
}

fn resolve_message(details: &ApiErrorDetails) -> String {
    if let Some(data) = &details.response_data {
        match data {
            Value::String(s) if !s.trim().is_empty() => return s.clone(),
            Value::Object(map) => {
                for field in MESSAGE_FIELDS {
                    if let Some(message) = map.get(field).and_then(Value::as_str) {
                        if !message.trim().is_empty() {
                            return message.to_string();
                        }
                    }
                }
                // Engine diagnostics nested one level down.
                for field in ENGINE_ERROR_FIELDS {
                    if let Some(Value::Object(inner)) = map.get(field) {
                        for key in ["message", "detail"] {
                            if let Some(message) = inner.get(key).and_then(Value::as_str) {
                                if !message.trim().is_empty() {
                                    return message.to_string();
                                }
                            }
                        }
                    }
                }
                return data.to_string();
            }
            _ => {}
        }
    }

    if !details.message.trim().is_empty() {
        return details.message.clone();
    }

    fallback_message(details.status).to_string()
}

fn fallback_message(status: Option<u16>) -> &'static str {
    if status == Some(500) {
        "Internal Server Error"
    } else {
        "An unknown error occurred"
    }
}

/// Some engines append a full JSON error dump to the human-readable message.
/// Re-parse it and keep only the interesting part.
fn clean_extended_context(message: &str) -> String {
    let Some(start) = message.find("{\"extended_context\"") else {
        return message.to_string();
    };

    if let Ok(blob) = serde_json::from_str::<Value>(&message[start..]) {
        if let Some(inner) = blob
            .pointer("/extended_context/message")
            .and_then(Value::as_str)
        {
            return inner.to_string();
        }
        if let Some(top) = blob.get("message").and_then(Value::as_str) {
            return top.to_string();
        }
    }

    match message.find(": {") {
        Some(cut) => message[..cut].to_string(),
        None => message.to_string(),
    }
}

use crate::types::CredentialField;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid client setup: {0}")]
    Setup(String),
}

impl ApiError {
    /// Maps a non-success response to an error, preferring the server's own wording.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            _ => ApiError::Remote {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// The single string shown in the wizard's error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Auth(_) => "You are not allowed to change this integration. Sign in again.".to_string(),
            ApiError::NotFound(msg) => format!("Not found: {msg}"),
            ApiError::Network(_) => "Network error. Check your connection.".to_string(),
            ApiError::Remote { message, .. } => message.clone(),
            ApiError::Decode(_) => "The server sent an unexpected response.".to_string(),
            ApiError::InvalidUrl(_) => "The server sent an invalid authorization link.".to_string(),
            ApiError::Setup(msg) => format!("Invalid client setup: {msg}"),
        }
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    #[error("{}", missing_message(.0))]
    MissingFields(Vec<CredentialField>),
}

fn missing_message(fields: &[CredentialField]) -> String {
    if fields.len() == CredentialField::ALL.len() {
        return "All fields are required".to_string();
    }
    let labels: Vec<&str> = fields.iter().map(|f| f.label()).collect();
    format!("{} is required", labels.join(" and "))
}

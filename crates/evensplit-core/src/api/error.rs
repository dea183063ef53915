use serde::Deserialize;
use thiserror::Error;

/// A failed API call, classified once at the client boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Unauthorized - session is missing or expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("{0}")]
    DomainError(String),
}

/// Maximum length for server-provided messages kept in errors
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Shown when login is refused and the server gave no reason
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials.";

/// Error payload shape returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl ApiError {
    /// Truncate a message to avoid logging excessive data
    fn truncate(message: &str) -> String {
        if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
            return message.to_string();
        }
        let mut end = MAX_ERROR_MESSAGE_LENGTH;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &message[..end],
            message.len()
        )
    }

    /// Pull `message` (or `error`) out of a JSON error body
    fn server_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        parsed
            .message
            .or(parsed.error)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::server_message(body)
            .map(|m| Self::truncate(&m))
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            _ => ApiError::DomainError(message),
        }
    }

    /// Classify a transport failure (no HTTP response, or an unreadable one)
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::NetworkError(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ApiError::DomainError(format!("Invalid response: {}", err))
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }

    /// A 401 from the login endpoint. No session is involved, so this is a
    /// domain error carrying the server's reason rather than `Unauthorized`.
    pub fn credentials_rejected(body: &str) -> Self {
        let message = Self::server_message(body)
            .map(|m| Self::truncate(&m))
            .unwrap_or_else(|| INVALID_CREDENTIALS_MESSAGE.to_string());
        ApiError::DomainError(message)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

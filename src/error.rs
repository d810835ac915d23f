//! Error taxonomy for streaming calls.

use serde::{Deserialize, Serialize};

/// Error reported by the server, either as an `error` frame mid-stream or as
/// the JSON envelope of a non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error_type}: {message}")]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    /// Error type the server uses when it is temporarily overloaded.
    pub const OVERLOADED: &'static str = "overloaded_error";

    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.error_type == Self::OVERLOADED
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection or body read failure.
    #[error("Network error: {0}")]
    Transport(String),
    /// The body ended before a terminal event arrived.
    #[error("Stream ended before a terminal event")]
    UnexpectedEof,
    /// Non-2xx response whose body is not an error envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// A known event name carried a payload that does not match its schema.
    #[error("Failed to decode `{event}` event: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("API error: {0}")]
    Api(ApiError),
    /// A line or frame payload grew past the reader's size cap.
    #[error("Event-stream frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
    #[error("Received more than {limit} consecutive unrecognized frames")]
    EmptyMessageLimitExceeded { limit: usize },
    /// Events arrived in an order the accumulator cannot apply.
    #[error("Stream consistency error: {0}")]
    Consistency(String),
    #[error("Cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether a caller may reasonably retry the whole request.
    ///
    /// Retryable: overloaded API errors, transport failures, truncated
    /// streams, and 429/5xx statuses. Nothing is retried at this layer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_overloaded(),
            Self::Transport(_) | Self::UnexpectedEof => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The server-reported error, if this is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overloaded_is_retryable() {
        let err = StreamError::Api(ApiError::new("overloaded_error", "Overloaded"));
        assert!(err.is_retryable());
        assert!(err.api_error().unwrap().is_overloaded());

        let err = StreamError::Api(ApiError::new("invalid_request_error", "bad temperature"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_guard_and_cancel_not_retryable() {
        assert!(!StreamError::EmptyMessageLimitExceeded { limit: 3 }.is_retryable());
        assert!(!StreamError::Cancelled.is_retryable());
        assert!(!StreamError::FrameTooLarge { limit: 1024 }.is_retryable());
        assert!(StreamError::Http {
            status: 529,
            body: String::new()
        }
        .is_retryable());
        assert!(!StreamError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_display() {
        let err = StreamError::Api(ApiError::new("overloaded_error", "Overloaded"));
        assert_eq!(err.to_string(), "API error: overloaded_error: Overloaded");
        assert_eq!(
            StreamError::EmptyMessageLimitExceeded { limit: 300 }.to_string(),
            "Received more than 300 consecutive unrecognized frames"
        );
    }
}

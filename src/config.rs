//! Client configuration.

use crate::stream::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::stream::guard::DEFAULT_EMPTY_MESSAGES_LIMIT;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Settings shared by every request a [`Client`](crate::Client) makes.
///
/// Defaults: the public API base URL, API version `2023-06-01`, no beta
/// flags, a tolerance of 300 consecutive unrecognized frames, and frames of
/// at most 4 MiB.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Base URL without the endpoint path, e.g. `https://api.anthropic.com/v1`.
    pub base_url: String,
    /// Sent as the `anthropic-version` header.
    pub api_version: String,
    /// Joined into the `anthropic-beta` header when non-empty.
    pub beta: Vec<String>,
    /// How many consecutive unrecognized frames a stream may carry before
    /// it is aborted.
    pub empty_messages_limit: usize,
    /// Cap on one event-stream line or frame payload, in bytes.
    pub max_frame_bytes: usize,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            beta: Vec::new(),
            empty_messages_limit: DEFAULT_EMPTY_MESSAGES_LIMIT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta.push(beta.into());
        self
    }

    pub fn with_empty_messages_limit(mut self, limit: usize) -> Self {
        self.empty_messages_limit = limit;
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Full URL for an endpoint path such as `/messages`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

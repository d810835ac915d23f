//! HTTP client for the streaming endpoints.

use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::stream::*;
use crate::types::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A `/complete` request plus the callbacks to run as frames arrive.
#[derive(Default)]
pub struct CompleteStreamRequest {
    pub request: CompleteRequest,
    pub handlers: CompleteHandlers,
}

impl CompleteStreamRequest {
    pub fn new(request: CompleteRequest) -> Self {
        Self {
            request,
            handlers: CompleteHandlers::default(),
        }
    }

    pub fn on_completion(mut self, f: impl FnMut(&CompleteResponse) + Send + 'static) -> Self {
        self.handlers.on_completion = Some(Box::new(f));
        self
    }

    pub fn on_ping(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.handlers.on_ping = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ErrorResponse) + Send + 'static) -> Self {
        self.handlers.on_error = Some(Box::new(f));
        self
    }
}

/// A `/messages` request plus the callbacks to run as frames arrive.
#[derive(Default)]
pub struct MessagesStreamRequest {
    pub request: MessagesRequest,
    pub handlers: MessagesHandlers,
}

impl MessagesStreamRequest {
    pub fn new(request: MessagesRequest) -> Self {
        Self {
            request,
            handlers: MessagesHandlers::default(),
        }
    }

    pub fn on_message_start(mut self, f: impl FnMut(&MessageStartEvent) + Send + 'static) -> Self {
        self.handlers.on_message_start = Some(Box::new(f));
        self
    }

    pub fn on_content_block_start(
        mut self,
        f: impl FnMut(&ContentBlockStartEvent) + Send + 'static,
    ) -> Self {
        self.handlers.on_content_block_start = Some(Box::new(f));
        self
    }

    pub fn on_content_block_delta(
        mut self,
        f: impl FnMut(&ContentBlockDeltaEvent) + Send + 'static,
    ) -> Self {
        self.handlers.on_content_block_delta = Some(Box::new(f));
        self
    }

    pub fn on_content_block_stop(
        mut self,
        f: impl FnMut(&ContentBlockStopEvent) + Send + 'static,
    ) -> Self {
        self.handlers.on_content_block_stop = Some(Box::new(f));
        self
    }

    pub fn on_message_delta(mut self, f: impl FnMut(&MessageDeltaEvent) + Send + 'static) -> Self {
        self.handlers.on_message_delta = Some(Box::new(f));
        self
    }

    pub fn on_message_stop(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.handlers.on_message_stop = Some(Box::new(f));
        self
    }

    pub fn on_ping(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.handlers.on_ping = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ErrorResponse) + Send + 'static) -> Self {
        self.handlers.on_error = Some(Box::new(f));
        self
    }
}

/// Request body with `stream: true` forced on.
#[derive(Serialize)]
struct StreamBody<'a, T> {
    #[serde(flatten)]
    request: &'a T,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies, ...).
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stream a legacy text completion.
    ///
    /// Returns once a `completion` frame carries a `stop_reason`.
    pub async fn create_complete_stream(
        &self,
        request: CompleteStreamRequest,
        cancel: CancellationToken,
    ) -> Result<CompleteResponse, StreamError> {
        let CompleteStreamRequest {
            request,
            mut handlers,
        } = request;
        debug!("Complete stream request: model={}", request.model);

        let response = self
            .open_stream("/complete", &request, &mut handlers.on_error, &cancel)
            .await?;
        let mut session = StreamSession::new(
            CompletionAccumulator::new(handlers),
            self.config.empty_messages_limit,
        );
        let reader = FrameReader::new(response.bytes_stream())
            .with_max_frame_bytes(self.config.max_frame_bytes);
        session.run(reader, &cancel).await
    }

    /// Stream a messages response.
    ///
    /// Returns once `message_stop` arrives.
    pub async fn create_messages_stream(
        &self,
        request: MessagesStreamRequest,
        cancel: CancellationToken,
    ) -> Result<MessagesResponse, StreamError> {
        let MessagesStreamRequest {
            request,
            mut handlers,
        } = request;
        debug!(
            "Messages stream request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .open_stream("/messages", &request, &mut handlers.on_error, &cancel)
            .await?;
        let mut session = StreamSession::new(
            MessagesAccumulator::new(handlers),
            self.config.empty_messages_limit,
        );
        let reader = FrameReader::new(response.bytes_stream())
            .with_max_frame_bytes(self.config.max_frame_bytes);
        session.run(reader, &cancel).await
    }

    /// POST the request and return the response once the status is known
    /// to be a success.
    async fn open_stream<T: Serialize>(
        &self,
        path: &str,
        request: &T,
        on_error: &mut Option<OnErrorFn>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, StreamError> {
        let url = self.config.endpoint(path);
        let mut builder = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream");
        if !self.config.beta.is_empty() {
            builder = builder.header("anthropic-beta", self.config.beta.join(","));
        }
        let send = builder
            .json(&StreamBody {
                request,
                stream: true,
            })
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            response = send => response.map_err(|e| StreamError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            body = response.text() => body.map_err(|e| StreamError::Transport(e.to_string()))?,
        };
        warn!("Stream request to {} failed: HTTP {}", url, status);
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => {
                if let Some(f) = on_error.as_mut() {
                    f(&error);
                }
                Err(StreamError::Api(error.error))
            }
            Err(_) => Err(StreamError::Http {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

//! Folding typed events into callbacks and a final response.
//!
//! Each API flavour has its own accumulator. Callbacks run synchronously on
//! the streaming task, in frame order, before the event is folded. A
//! callback that blocks stalls the stream.

use super::event::*;
use crate::error::StreamError;
use crate::types::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub type OnPingFn = Box<dyn FnMut() + Send>;
pub type OnErrorFn = Box<dyn FnMut(&ErrorResponse) + Send>;
pub type OnCompletionFn = Box<dyn FnMut(&CompleteResponse) + Send>;
pub type OnMessageStartFn = Box<dyn FnMut(&MessageStartEvent) + Send>;
pub type OnContentBlockStartFn = Box<dyn FnMut(&ContentBlockStartEvent) + Send>;
pub type OnContentBlockDeltaFn = Box<dyn FnMut(&ContentBlockDeltaEvent) + Send>;
pub type OnContentBlockStopFn = Box<dyn FnMut(&ContentBlockStopEvent) + Send>;
pub type OnMessageDeltaFn = Box<dyn FnMut(&MessageDeltaEvent) + Send>;
pub type OnMessageStopFn = Box<dyn FnMut() + Send>;

/// Whether the stream should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A success terminal event was applied.
    Done,
}

/// Folds events for one API flavour.
pub trait Accumulator {
    type Output;

    /// Apply one event in arrival order.
    fn apply(&mut self, event: TypedEvent) -> Result<Flow, StreamError>;

    /// Produce the aggregate after [`Flow::Done`].
    fn finish(&mut self) -> Result<Self::Output, StreamError>;
}

/// Invoke `on_error` and turn the server's error frame into a `StreamError`.
fn raise(on_error: &mut Option<OnErrorFn>, response: ErrorResponse) -> StreamError {
    warn!(
        "Stream error event: {}: {}",
        response.error.error_type, response.error.message
    );
    if let Some(f) = on_error.as_mut() {
        f(&response);
    }
    StreamError::Api(response.error)
}

// ---------------------------------------------------------------------------
// Completion API
// ---------------------------------------------------------------------------

/// Callbacks for a `/complete` stream. Unset hooks are skipped.
#[derive(Default)]
pub struct CompleteHandlers {
    pub on_completion: Option<OnCompletionFn>,
    pub on_ping: Option<OnPingFn>,
    pub on_error: Option<OnErrorFn>,
}

pub struct CompletionAccumulator {
    handlers: CompleteHandlers,
    response: CompleteResponse,
}

impl CompletionAccumulator {
    pub fn new(handlers: CompleteHandlers) -> Self {
        Self {
            handlers,
            response: CompleteResponse::default(),
        }
    }

    /// Completion text received so far.
    pub fn text(&self) -> &str {
        &self.response.completion
    }
}

impl Accumulator for CompletionAccumulator {
    type Output = CompleteResponse;

    fn apply(&mut self, event: TypedEvent) -> Result<Flow, StreamError> {
        match event {
            TypedEvent::Ping => {
                if let Some(f) = self.handlers.on_ping.as_mut() {
                    f();
                }
            }
            TypedEvent::Completion(data) => {
                if let Some(f) = self.handlers.on_completion.as_mut() {
                    f(&data);
                }
                let CompleteResponse {
                    response_type,
                    id,
                    completion,
                    stop_reason,
                    model,
                    stop,
                    log_id,
                } = data;
                self.response.completion.push_str(&completion);
                self.response.response_type = response_type;
                self.response.id = id;
                self.response.model = model;
                self.response.stop = stop;
                self.response.log_id = log_id;
                self.response.stop_reason = stop_reason;
                if self.response.stop_reason.is_some() {
                    return Ok(Flow::Done);
                }
            }
            TypedEvent::Error(response) => return Err(raise(&mut self.handlers.on_error, response)),
            TypedEvent::Unrecognized { .. } => {}
            other => debug!("Ignoring {} event on completion stream", other.name()),
        }
        Ok(Flow::Continue)
    }

    fn finish(&mut self) -> Result<CompleteResponse, StreamError> {
        Ok(std::mem::take(&mut self.response))
    }
}

// ---------------------------------------------------------------------------
// Messages API
// ---------------------------------------------------------------------------

/// Callbacks for a `/messages` stream. Unset hooks are skipped.
#[derive(Default)]
pub struct MessagesHandlers {
    pub on_message_start: Option<OnMessageStartFn>,
    pub on_content_block_start: Option<OnContentBlockStartFn>,
    pub on_content_block_delta: Option<OnContentBlockDeltaFn>,
    pub on_content_block_stop: Option<OnContentBlockStopFn>,
    pub on_message_delta: Option<OnMessageDeltaFn>,
    pub on_message_stop: Option<OnMessageStopFn>,
    pub on_ping: Option<OnPingFn>,
    pub on_error: Option<OnErrorFn>,
}

#[derive(Debug)]
struct BlockSlot {
    block: ContentBlock,
    /// Raw `input_json_delta` fragments for tool-use blocks.
    partial_json: String,
    stopped: bool,
}

impl BlockSlot {
    fn accepts(&self, delta: &Delta) -> bool {
        matches!(
            (&self.block, delta),
            (ContentBlock::Text { .. }, Delta::TextDelta { .. })
                | (ContentBlock::ToolUse { .. }, Delta::InputJsonDelta { .. })
                | (ContentBlock::Thinking { .. }, Delta::ThinkingDelta { .. })
                | (ContentBlock::Thinking { .. }, Delta::SignatureDelta { .. })
        )
    }

    fn push(&mut self, delta: Delta) {
        match (&mut self.block, delta) {
            (ContentBlock::Text { text }, Delta::TextDelta { text: d }) => text.push_str(&d),
            (ContentBlock::ToolUse { .. }, Delta::InputJsonDelta { partial_json }) => {
                self.partial_json.push_str(&partial_json)
            }
            (ContentBlock::Thinking { thinking, .. }, Delta::ThinkingDelta { thinking: d }) => {
                thinking.push_str(&d)
            }
            (ContentBlock::Thinking { signature, .. }, Delta::SignatureDelta { signature: s }) => {
                *signature = Some(s)
            }
            // rejected by `accepts`
            _ => {}
        }
    }

    fn close(&mut self) -> Result<(), StreamError> {
        self.stopped = true;
        if let ContentBlock::ToolUse { input, .. } = &mut self.block {
            if !self.partial_json.is_empty() {
                *input = serde_json::from_str(&self.partial_json).map_err(|source| {
                    StreamError::Decode {
                        event: "content_block_stop".into(),
                        source,
                    }
                })?;
            }
        }
        Ok(())
    }
}

pub struct MessagesAccumulator {
    handlers: MessagesHandlers,
    message: Option<MessagesResponse>,
    blocks: BTreeMap<usize, BlockSlot>,
}

impl MessagesAccumulator {
    pub fn new(handlers: MessagesHandlers) -> Self {
        Self {
            handlers,
            message: None,
            blocks: BTreeMap::new(),
        }
    }

    /// Text accumulated so far for block `index`, if it is a text block.
    pub fn block_text(&self, index: usize) -> Option<&str> {
        self.blocks.get(&index).and_then(|s| s.block.as_text())
    }

    fn slot(&mut self, index: usize, event: &str) -> Result<&mut BlockSlot, StreamError> {
        let slot = self.blocks.get_mut(&index).ok_or_else(|| {
            StreamError::Consistency(format!(
                "{} for index {} before content_block_start",
                event, index
            ))
        })?;
        if slot.stopped {
            return Err(StreamError::Consistency(format!(
                "{} for index {} after content_block_stop",
                event, index
            )));
        }
        Ok(slot)
    }

    fn message_mut(&mut self, event: &str) -> Result<&mut MessagesResponse, StreamError> {
        self.message
            .as_mut()
            .ok_or_else(|| StreamError::Consistency(format!("{} before message_start", event)))
    }
}

impl Accumulator for MessagesAccumulator {
    type Output = MessagesResponse;

    fn apply(&mut self, event: TypedEvent) -> Result<Flow, StreamError> {
        match event {
            TypedEvent::Ping => {
                if let Some(f) = self.handlers.on_ping.as_mut() {
                    f();
                }
            }
            TypedEvent::MessageStart(data) => {
                if self.message.is_some() {
                    return Err(StreamError::Consistency("duplicate message_start".into()));
                }
                if let Some(f) = self.handlers.on_message_start.as_mut() {
                    f(&data);
                }
                debug!(
                    "Message started: id={} model={}",
                    data.message.id, data.message.model
                );
                self.message = Some(data.message);
            }
            TypedEvent::ContentBlockStart(data) => {
                if self.blocks.contains_key(&data.index) {
                    return Err(StreamError::Consistency(format!(
                        "duplicate content_block_start for index {}",
                        data.index
                    )));
                }
                if let Some(f) = self.handlers.on_content_block_start.as_mut() {
                    f(&data);
                }
                self.blocks.insert(
                    data.index,
                    BlockSlot {
                        block: data.content_block,
                        partial_json: String::new(),
                        stopped: false,
                    },
                );
            }
            TypedEvent::ContentBlockDelta(data) => {
                let slot = self.slot(data.index, "content_block_delta")?;
                if !slot.accepts(&data.delta) {
                    return Err(StreamError::Consistency(format!(
                        "{} applied to {} block at index {}",
                        data.delta.kind(),
                        slot.block.kind(),
                        data.index
                    )));
                }
                if let Some(f) = self.handlers.on_content_block_delta.as_mut() {
                    f(&data);
                }
                if let Some(slot) = self.blocks.get_mut(&data.index) {
                    slot.push(data.delta);
                }
            }
            TypedEvent::ContentBlockStop(data) => {
                self.slot(data.index, "content_block_stop")?.close()?;
                if let Some(f) = self.handlers.on_content_block_stop.as_mut() {
                    f(&data);
                }
            }
            TypedEvent::MessageDelta(data) => {
                self.message_mut("message_delta")?;
                if let Some(f) = self.handlers.on_message_delta.as_mut() {
                    f(&data);
                }
                let message = self.message_mut("message_delta")?;
                if data.delta.stop_reason.is_some() {
                    message.stop_reason = data.delta.stop_reason;
                }
                if data.delta.stop_sequence.is_some() {
                    message.stop_sequence = data.delta.stop_sequence;
                }
                if let Some(usage) = data.usage {
                    message.usage.output_tokens = usage.output_tokens;
                }
            }
            TypedEvent::MessageStop => {
                self.message_mut("message_stop")?;
                if let Some(f) = self.handlers.on_message_stop.as_mut() {
                    f();
                }
                return Ok(Flow::Done);
            }
            TypedEvent::Error(response) => return Err(raise(&mut self.handlers.on_error, response)),
            TypedEvent::Unrecognized { .. } => {}
            TypedEvent::Completion(_) => debug!("Ignoring completion event on messages stream"),
        }
        Ok(Flow::Continue)
    }

    fn finish(&mut self) -> Result<MessagesResponse, StreamError> {
        let mut message = self.message.take().ok_or_else(|| {
            StreamError::Consistency("stream finished without message_start".into())
        })?;
        let blocks = std::mem::take(&mut self.blocks);
        message.content = blocks
            .into_iter()
            .map(|(index, slot)| {
                if !slot.stopped {
                    debug!("Content block {} was never stopped", index);
                }
                slot.block
            })
            .collect();
        Ok(message)
    }
}

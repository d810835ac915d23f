//! Typed stream events and the frame decoder.

use super::frame::RawFrame;
use crate::error::StreamError;
use crate::types::*;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStartEvent {
    pub message: MessagesResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlockStartEvent {
    pub index: usize,
    pub content_block: ContentBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlockDeltaEvent {
    pub index: usize,
    pub delta: Delta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[allow(clippy::enum_variant_names)]
pub enum Delta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
}

impl Delta {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::InputJsonDelta { .. } => "input_json_delta",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::SignatureDelta { .. } => "signature_delta",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentBlockStopEvent {
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDeltaEvent {
    pub delta: MessageDeltaBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<MessageDeltaUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MessageDeltaUsage {
    /// Cumulative for the message, not an increment.
    #[serde(default)]
    pub output_tokens: u64,
}

// ---------------------------------------------------------------------------
// TypedEvent
// ---------------------------------------------------------------------------

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    Ping,
    Completion(CompleteResponse),
    MessageStart(MessageStartEvent),
    ContentBlockStart(ContentBlockStartEvent),
    ContentBlockDelta(ContentBlockDeltaEvent),
    ContentBlockStop(ContentBlockStopEvent),
    MessageDelta(MessageDeltaEvent),
    MessageStop,
    Error(ErrorResponse),
    /// Frame with an empty or unknown event name. Its payload is never parsed.
    Unrecognized { event: String },
}

impl TypedEvent {
    /// Decode a frame by its event name.
    ///
    /// Unknown names become [`TypedEvent::Unrecognized`]. A known name whose
    /// payload does not fit its schema is a [`StreamError::Decode`]; noise is
    /// tolerated, a broken event is not.
    pub fn decode(frame: &RawFrame) -> Result<Self, StreamError> {
        let event = match frame.event.as_str() {
            "ping" => {
                parse::<IgnoredAny>(frame)?;
                Self::Ping
            }
            "completion" => Self::Completion(parse(frame)?),
            "message_start" => Self::MessageStart(parse(frame)?),
            "content_block_start" => Self::ContentBlockStart(parse(frame)?),
            "content_block_delta" => Self::ContentBlockDelta(parse(frame)?),
            "content_block_stop" => Self::ContentBlockStop(parse(frame)?),
            "message_delta" => Self::MessageDelta(parse(frame)?),
            "message_stop" => {
                parse::<IgnoredAny>(frame)?;
                Self::MessageStop
            }
            "error" => Self::Error(parse(frame)?),
            other => Self::Unrecognized {
                event: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Completion(_) => "completion",
            Self::MessageStart(_) => "message_start",
            Self::ContentBlockStart(_) => "content_block_start",
            Self::ContentBlockDelta(_) => "content_block_delta",
            Self::ContentBlockStop(_) => "content_block_stop",
            Self::MessageDelta(_) => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Error(_) => "error",
            Self::Unrecognized { event } => event,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

fn parse<T: DeserializeOwned>(frame: &RawFrame) -> Result<T, StreamError> {
    serde_json::from_slice(&frame.data).map_err(|source| StreamError::Decode {
        event: frame.event.clone(),
        source,
    })
}

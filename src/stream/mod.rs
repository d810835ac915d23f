//! Streaming response decoder.
//!
//! The pipeline for one call, leaf first:
//!
//! - [`frame`]: bytes → [`RawFrame`]s (blank-line delimited)
//! - [`event`]: [`RawFrame`] → [`TypedEvent`], by event name
//! - [`guard`]: bounds runs of unrecognized frames
//! - [`session`]: folds events into callbacks and the final response
//! - [`controller`]: the read loop, cancellation and terminal state

pub mod controller;
pub mod event;
pub mod frame;
pub mod guard;
pub mod session;

pub use controller::{SessionState, StreamSession};
pub use event::*;
pub use frame::{FrameReader, RawFrame};
pub use guard::{EmptyFrameGuard, DEFAULT_EMPTY_MESSAGES_LIMIT};
pub use session::*;

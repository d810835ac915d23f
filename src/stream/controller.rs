//! The streaming read loop.

use super::event::TypedEvent;
use super::frame::{FrameReader, RawFrame};
use super::guard::EmptyFrameGuard;
use super::session::{Accumulator, Flow};
use crate::error::StreamError;
use futures::Stream;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of one streaming call. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Completed,
    Errored,
    Aborted,
    Canceled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Streaming)
    }

    fn from_outcome<T>(outcome: &Result<T, StreamError>) -> Self {
        match outcome {
            Ok(_) => Self::Completed,
            Err(StreamError::EmptyMessageLimitExceeded { .. }) => Self::Aborted,
            Err(StreamError::Cancelled) => Self::Canceled,
            Err(_) => Self::Errored,
        }
    }
}

/// State for one streaming call: the accumulator, the empty-frame guard and
/// the lifecycle state. Never shared between calls.
pub struct StreamSession<A> {
    accumulator: A,
    guard: EmptyFrameGuard,
    state: SessionState,
    frames: usize,
}

impl<A: Accumulator> StreamSession<A> {
    pub fn new(accumulator: A, empty_messages_limit: usize) -> Self {
        Self {
            accumulator,
            guard: EmptyFrameGuard::new(empty_messages_limit),
            state: SessionState::Idle,
            frames: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames read so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn accumulator(&self) -> &A {
        &self.accumulator
    }

    /// Decode one frame, run it past the guard, then fold it.
    pub fn handle_frame(&mut self, frame: &RawFrame) -> Result<Flow, StreamError> {
        self.frames += 1;
        let event = TypedEvent::decode(frame)?;
        if !event.is_recognized() {
            debug!("Unrecognized frame: event={:?}", frame.event);
        }
        self.guard.observe(&event)?;
        self.accumulator.apply(event)
    }

    /// Drive `reader` until a terminal condition and return the aggregate.
    ///
    /// Cancellation is checked before every read and raced against a read
    /// that is blocked on the network. The reader, and the connection it
    /// owns, is dropped before this returns on every path.
    pub async fn run<S, B, E>(
        &mut self,
        mut reader: FrameReader<S>,
        cancel: &CancellationToken,
    ) -> Result<A::Output, StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        if self.state.is_terminal() {
            return Err(StreamError::Consistency(format!(
                "session already finished ({:?})",
                self.state
            )));
        }
        self.state = SessionState::Streaming;

        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(StreamError::Cancelled);
            }
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(StreamError::Cancelled),
                frame = reader.next_frame() => frame,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => break Err(StreamError::UnexpectedEof),
                Err(e) => break Err(e),
            };
            match self.handle_frame(&frame) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        drop(reader);

        let result = outcome.and_then(|()| self.accumulator.finish());
        self.state = SessionState::from_outcome(&result);
        debug!(
            "Stream finished: state={:?} frames={}",
            self.state, self.frames
        );
        result
    }
}

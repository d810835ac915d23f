pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{Client, CompleteStreamRequest, MessagesStreamRequest};
pub use config::ClientConfig;
pub use error::{ApiError, StreamError};
pub use types::*;

//! # recon_consumer
//!
//! Drives reconciliation runs from a stream of messages.
//!
//! A [`Consumer`] subscribes a [`MessageSource`] to the organization's
//! topics, decodes every message as JSON and hands it to a
//! [`MessageHandler`]. The offset is committed after each processing
//! attempt, whether it succeeded or not, so a poisoned message is never
//! redelivered forever.
//!
//! The loop stops when its [`CancellationToken`] is tripped or the source
//! reports that it is exhausted. The in-flight message always finishes
//! first.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recon_consumer::{CancellationToken, Consumer, ConsumerConfig, MemorySource, ReconcileHandler};
//!
//! let handler = ReconcileHandler::new(applier);
//! let mut consumer = Consumer::new(ConsumerConfig::new("acme"), source, handler);
//! let stats = consumer.run(&CancellationToken::new())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod consumer;
mod error;
mod handler;
mod source;

pub use cancel::CancellationToken;
pub use config::ConsumerConfig;
pub use consumer::{Consumer, ConsumerStats};
pub use error::{ConsumerError, ConsumerResult};
pub use handler::{MessageHandler, ReconcileCommand, ReconcileHandler};
pub use source::{JsonLinesSource, MemorySource, Message, MessageSource};

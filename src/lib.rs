#![forbid(unsafe_code)]

//! Streaming content classification and event delivery for AI coding-agent
//! jobs.
//!
//! - [`classifier`] turns chunked, tag-annotated model output into typed
//!   spans;
//! - [`stream`] tracks one push connection per job and emits lifecycle
//!   events with a two-phase shutdown;
//! - [`http`] exposes job streams as server-sent events.

pub mod classifier;
pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod stream;

pub use classifier::ContentClassifier;
pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use stream::{ConnectionRegistry, EventEmitter};

//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every failure mode surfaced by the pipeline.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Concurrent stream ceiling reached; the stream was not opened.
    Capacity(String),
    /// Writing to or ending a client transport failed.
    Transport(String),
    /// Event payload could not be serialized for the wire.
    Serialization(String),
    /// HTTP listener or socket failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

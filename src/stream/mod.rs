//! Event delivery: connection registry, per-job emitters, and transports.

pub mod emitter;
mod keep_alive;
pub mod lifecycle;
pub mod registry;
pub mod sweeper;
pub mod transport;

pub use emitter::EventEmitter;
pub use lifecycle::StreamState;
pub use registry::{ConnectionInfo, ConnectionRegistry, ShutdownTicket, StreamStats};
pub use sweeper::spawn_idle_sweeper;
pub use transport::{ChannelSink, EventSink};

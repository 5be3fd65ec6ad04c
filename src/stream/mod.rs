//! Push connection to the workflow API
//!
//! - `framing`: byte chunks to payload lines
//! - `transport`: the HTTP connection (and a seam for tests)
//! - `channel`: ordered, terminating delivery of parsed events

pub mod channel;
pub mod framing;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelHandle, EventChannel};
pub use framing::{LineDecoder, MAX_LINE_BUFFER_SIZE};
pub use transport::{ByteStream, EventTransport, HealthStatus, HttpTransport};

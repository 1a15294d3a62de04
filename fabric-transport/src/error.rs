use fabric_proto::CodecError;
use thiserror::Error;

/// Errors raised by the transport engine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("wire codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("endpoint not found for handle {0}")]
    UnknownEndpoint(u64),
    #[error("endpoint manager is full: at most {0} endpoints per poll group")]
    EndpointManagerFull(usize),
    #[error("Tx queue is full")]
    QueueFull,
    #[error("operation invalid in probe state {0:?}")]
    InvalidProbeState(&'static str),
    #[error("Rx window overflowed: payload {payload_num} is {distance} slots ahead of the window")]
    WindowOverflow { payload_num: u32, distance: u32 },
    #[error("adapter error: {0}")]
    Adapter(String),
    #[error("connection was reset by the remote endpoint")]
    ConnectionReset,
}

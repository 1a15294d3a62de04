//! Wire encoding for the fabric transport's control and data packets.
//!
//! This crate only knows about bytes on the wire: packet headers, checksums,
//! and version negotiation. It has no notion of endpoints, connections, or
//! scheduling — those live in `fabric-transport`, which depends on this crate
//! for everything that touches a byte buffer.

pub mod checksum;
pub mod constants;
pub mod control;
pub mod data;
pub mod error;
pub mod version;

pub use checksum::{checksum16, verify16};
pub use control::{AckExtra, ControlCommand, ControlHeader, ControlPacket, ProtocolVersion};
pub use data::{CommonFields, DataOffsetExtension, DataPacket, Num0Extension, PayloadType, PtpTimestamp};
pub use error::CodecError;
pub use version::{negotiate, Negotiation};

//! Receive-side reassembly: packet reorder, payload reorder, linear gather,
//! and optional buffered delay.

pub mod buffered_delay;
pub mod linear_gather;
pub mod packet_reorder;
pub mod payload_reorder;
pub mod payload_state;

pub use buffered_delay::BufferedDelay;
pub use linear_gather::{to_linear, LinearPayload};
pub use packet_reorder::{FlushOutcome, PacketReorder};
pub use payload_reorder::{PayloadReorder, RxEvent};

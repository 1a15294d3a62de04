//! Send-side enqueue accounting and ack bookkeeping.

pub mod ack;
pub mod enqueue;

pub use ack::AckTracker;
pub use enqueue::TxEnqueue;

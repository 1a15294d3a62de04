//! Cross-thread primitives used by the poll engine: a wakeable signal.

pub mod signal;

pub use signal::Signal;

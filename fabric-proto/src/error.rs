use thiserror::Error;

/// Errors raised while encoding or decoding wire packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer too short: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown command byte {0:#x}")]
    UnknownCommand(u8),
    #[error("unknown payload type byte {0:#x}")]
    UnknownPayloadType(u8),
    #[error("checksum mismatch: computed {computed:#06x}, header had {declared:#06x}")]
    ChecksumMismatch { computed: u16, declared: u16 },
    #[error("declared size {declared} does not match command {command}'s fixed size {expected}")]
    SizeMismatch {
        command: &'static str,
        declared: usize,
        expected: usize,
    },
    #[error("string field exceeded its fixed capacity")]
    StringTooLong,
    #[error("extra_data field exceeded its fixed capacity")]
    ExtraDataTooLong,
}

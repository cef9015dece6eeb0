use thiserror::Error;

/// Error taxonomy surfaced by the decoder core.
///
/// Recovery policy (see spec §7): during metadata enumeration,
/// `UnmappableAddress`, `CorruptNode` and `TruncatedPayload` are caught at
/// the call site and turned into a skipped node/item rather than
/// propagated — they only escape as `Err` when they occur somewhere with
/// no fallback (the root tree itself, the superblock, the image file).
#[derive(Error, Debug)]
pub enum BtrfsError {
    #[error("image file not found: {0}")]
    ImageNotFound(String),

    #[error("invalid superblock: {0}")]
    InvalidSuperblock(String),

    #[error("logical address {0:#x} is not mapped by any known chunk")]
    UnmappableAddress(u64),

    #[error("corrupt tree node at {0:#x}: {1}")]
    CorruptNode(u64, String),

    #[error("truncated payload: expected at least {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("no decompressor registered for compression tag {0}")]
    DecompressionUnavailable(u8),

    #[error("decompression failed for compression tag {0}")]
    DecompressionFailed(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BtrfsError>;

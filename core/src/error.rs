use thiserror::Error;

use crate::header::Digest;

/// Stable numeric tags for relay failures. `0` is reserved for success so the
/// codes can be surfaced to callers that only understand integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    UnknownBlock = 1,
    BadPrevHash = 2,
    InsufficientWork = 3,
    UnexpectedDifficultyChange = 4,
    WrongDifficulty = 5,
    BadEpochStart = 6,
    MalformedBits = 7,
    EmptySegment = 8,
    BadHeaderLength = 9,
    NotBestKnown = 10,
    NotHeavier = 11,
    AlreadyInitialized = 12,
    Uninitialized = 13,
    BadHeaderHex = 14,
    HeightOverflow = 15,
    Store = 100,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Failure raised by a `RelayStore` backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("state store failure: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        StoreError(msg.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("block {0} is not known to the relay")]
    UnknownBlock(Digest),

    #[error("header {header} points at {got}, expected parent {expected}")]
    BadPrevHash {
        header: Digest,
        expected: Digest,
        got: Digest,
    },

    #[error("header {0} does not meet its target")]
    InsufficientWork(Digest),

    #[error("header {header} changes difficulty: bits {got:#010x}, expected {expected:#010x}")]
    UnexpectedDifficultyChange {
        header: Digest,
        expected: u32,
        got: u32,
    },

    #[error("retarget header {header} carries bits {got:#010x}, expected {expected:#010x}")]
    WrongDifficulty {
        header: Digest,
        expected: u32,
        got: u32,
    },

    #[error("epoch start at height {start_height} and anchor at height {anchor_height} do not bound an epoch")]
    BadEpochStart {
        start_height: u32,
        anchor_height: u32,
    },

    #[error("malformed compact target {0:#010x}")]
    MalformedBits(u32),

    #[error("header segment is empty")]
    EmptySegment,

    #[error("block header must be 80 bytes, got {0}")]
    BadHeaderLength(usize),

    #[error("block header is not valid hex: {0}")]
    BadHeaderHex(String),

    #[error("segment on top of height {0} runs past the largest block height")]
    HeightOverflow(u32),

    #[error("block {0} is not the best known digest")]
    NotBestKnown(Digest),

    #[error("block {new_best} does not carry more work than the current best {current_best}")]
    NotHeavier {
        current_best: Digest,
        new_best: Digest,
    },

    #[error("relay is already initialized")]
    AlreadyInitialized,

    #[error("relay is not initialized")]
    Uninitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::UnknownBlock(_) => ErrorCode::UnknownBlock,
            RelayError::BadPrevHash { .. } => ErrorCode::BadPrevHash,
            RelayError::InsufficientWork(_) => ErrorCode::InsufficientWork,
            RelayError::UnexpectedDifficultyChange { .. } => ErrorCode::UnexpectedDifficultyChange,
            RelayError::WrongDifficulty { .. } => ErrorCode::WrongDifficulty,
            RelayError::BadEpochStart { .. } => ErrorCode::BadEpochStart,
            RelayError::MalformedBits(_) => ErrorCode::MalformedBits,
            RelayError::EmptySegment => ErrorCode::EmptySegment,
            RelayError::BadHeaderLength(_) => ErrorCode::BadHeaderLength,
            RelayError::BadHeaderHex(_) => ErrorCode::BadHeaderHex,
            RelayError::HeightOverflow(_) => ErrorCode::HeightOverflow,
            RelayError::NotBestKnown(_) => ErrorCode::NotBestKnown,
            RelayError::NotHeavier { .. } => ErrorCode::NotHeavier,
            RelayError::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            RelayError::Uninitialized => ErrorCode::Uninitialized,
            RelayError::Store(_) => ErrorCode::Store,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

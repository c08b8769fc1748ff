//! Error types for netsync core

use crate::codec::CodecError;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// netsync core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Packed codec failure
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Canonical serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// A soft-sync descriptor cannot be encoded while prefab sync is active
    #[error("soft-sync descriptor cannot be encoded in prefab-sync mode")]
    DescriptorModeMismatch,

    /// A field the active wire mode requires was not provided
    #[error("missing field for this wire mode: {0}")]
    MissingField(&'static str),

    /// Response status byte outside the known set
    #[error("unknown rpc response status: {0}")]
    UnknownRpcStatus(u8),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

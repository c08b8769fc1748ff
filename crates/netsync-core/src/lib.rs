//! netsync Core Library
//!
//! This crate provides the identity types, the packed binary codec, and the
//! shared network configuration used by every netsync peer.
//!
//! # Modules
//!
//! - [`codec`]: Packed reader/writer (varints, length-prefixed blocks, floats)
//! - [`types`]: Protocol types (PeerId, NetworkId, SpawnDescriptor, etc.)
//! - [`config`]: Shared configuration and its compatibility hash
//! - [`hashing`]: Domain-separated hash derivations
//! - [`error`]: Error types

pub mod codec;
pub mod config;
pub mod error;
pub mod hashing;
pub mod types;

pub use codec::{CodecError, PackedReader, PackedWriter};
pub use config::NetworkConfig;
pub use error::{Error, Result};
pub use types::*;

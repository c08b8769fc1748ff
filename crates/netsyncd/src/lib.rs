//! netsyncd - netsync session layer
//!
//! This crate provides:
//! - Role-specific message dispatch tables
//! - RPC response correlation
//! - The replicated object registry
//! - Scene switch coordination
//! - The network session tying them to a transport and a local world

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod registry;
pub mod scene;
pub mod session;
pub mod world;

pub use config::Config;
pub use correlation::{CorrelationTable, ResponseHandle, ResponseKind, RpcFailure, RpcValue};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use registry::{NetworkObjectRecord, Registry};
pub use scene::{SceneCoordinator, SwitchHandle, SwitchOutcome};
pub use session::{Approval, NetworkSession, SessionError, SessionEvent, SessionOptions};
pub use world::{MemoryScenes, MemoryWorld, ObjectWorld, SceneLoader};

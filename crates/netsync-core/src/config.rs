//! Shared network configuration
//!
//! Every peer must run with an identical configuration; the connection
//! request carries [`NetworkConfig::config_hash`] and a mismatch is a hard
//! rejection.

use crate::error::{Error, Result};
use crate::hashing;
use crate::types::SceneIndex;
use serde::{Deserialize, Serialize};

/// Configuration shared by server and clients
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Protocol version; bump on incompatible wire changes
    pub protocol_version: u16,
    /// Run the key exchange and encrypt traffic after the handshake
    pub enable_encryption: bool,
    /// Authenticate the key exchange with the server certificate
    pub sign_key_exchange: bool,
    /// Identify objects by prefab hash only (the snapshot is the sole truth)
    pub use_prefab_sync: bool,
    /// Route connection requests through the approval hook
    pub connection_approval: bool,
    /// Scenes that may be switched to; position is the scene index
    pub registered_scenes: Vec<String>,
    /// Prefabs that may be instantiated by hash
    pub network_prefabs: Vec<String>,
    /// Maximum objects per batch-add message
    pub max_batch_objects: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            enable_encryption: false,
            sign_key_exchange: false,
            use_prefab_sync: false,
            connection_approval: false,
            registered_scenes: vec!["Main".to_string()],
            network_prefabs: vec!["Player".to_string()],
            max_batch_objects: 256,
        }
    }
}

/// Fields that feed the compatibility hash (field order is hash order)
#[derive(Serialize)]
struct HashedFields<'a> {
    protocol_version: u16,
    enable_encryption: bool,
    sign_key_exchange: bool,
    use_prefab_sync: bool,
    connection_approval: bool,
    registered_scenes: &'a [String],
    network_prefabs: &'a [String],
}

impl NetworkConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sign_key_exchange && !self.enable_encryption {
            return Err(Error::InvalidConfig(
                "sign_key_exchange requires enable_encryption".into(),
            ));
        }
        if self.registered_scenes.is_empty() {
            return Err(Error::InvalidConfig("at least one scene must be registered".into()));
        }
        for (i, name) in self.registered_scenes.iter().enumerate() {
            if self.registered_scenes[..i].contains(name) {
                return Err(Error::InvalidConfig(format!("duplicate scene name: {name}")));
            }
        }
        if self.max_batch_objects == 0 {
            return Err(Error::InvalidConfig("max_batch_objects must be positive".into()));
        }
        Ok(())
    }

    /// Compatibility hash sent with every connection request
    pub fn config_hash(&self) -> Result<u64> {
        let fields = HashedFields {
            protocol_version: self.protocol_version,
            enable_encryption: self.enable_encryption,
            sign_key_exchange: self.sign_key_exchange,
            use_prefab_sync: self.use_prefab_sync,
            connection_approval: self.connection_approval,
            registered_scenes: &self.registered_scenes,
            network_prefabs: &self.network_prefabs,
        };
        let bytes = postcard::to_allocvec(&fields)?;
        Ok(hashing::config_hash(&bytes))
    }

    /// Check a peer's hash against ours
    pub fn compare_config(&self, hash: u64) -> bool {
        matches!(self.config_hash(), Ok(ours) if ours == hash)
    }

    pub fn scene_index(&self, name: &str) -> Option<SceneIndex> {
        self.registered_scenes
            .iter()
            .position(|s| s == name)
            .map(|i| SceneIndex(i as u32))
    }

    pub fn scene_name(&self, index: SceneIndex) -> Option<&str> {
        self.registered_scenes
            .get(index.0 as usize)
            .map(String::as_str)
    }

    pub fn is_registered_prefab(&self, prefab_hash: u64) -> bool {
        self.network_prefabs
            .iter()
            .any(|name| hashing::prefab_hash(name) == prefab_hash)
    }
}

//! Core protocol types for netsync
//!
//! Identity newtypes, the spawn descriptor, and the object spawn record that
//! is shared by the join snapshot and the incremental add paths.

use crate::codec::{CodecError, PackedReader, PackedWriter};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// IDENTITY TYPES (newtypes for type safety)
// =============================================================================

/// Transport-level peer identifier
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The server's own identity
    pub const SERVER: PeerId = PeerId(0);

    pub fn is_server(&self) -> bool {
        *self == Self::SERVER
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Session-unique replicated object identifier
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Correlation key linking an RPC request to its response
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseId(pub u64);

/// Index of a registered scene
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneIndex(pub u32);

impl fmt::Display for SceneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// Scene switch identifier (128-bit)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SwitchId(pub [u8; 16]);

impl SwitchId {
    /// Sentinel for the initial scene: no progress is tracked for it
    pub const NIL: SwitchId = SwitchId([0; 16]);

    /// Generate a fresh random identifier (never NIL)
    pub fn generate() -> Self {
        loop {
            let id = SwitchId(rand::random());
            if !id.is_nil() {
                return id;
            }
        }
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// =============================================================================
// SPATIAL
// =============================================================================

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn encode(&self, writer: &mut PackedWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
    }

    fn decode(reader: &mut PackedReader<'_>) -> std::result::Result<Self, CodecError> {
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
        })
    }
}

/// Spawn pose: position plus euler rotation in degrees
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Vec3::ZERO,
        }
    }
}

// =============================================================================
// SPAWN DESCRIPTOR
// =============================================================================

/// How a receiving peer materialises a replicated object
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SpawnDescriptor {
    /// Bind to scene content already present locally
    SoftSync { instance_id: u64 },
    /// Instantiate fresh from a registered prefab
    Prefab { prefab_hash: u64 },
}

impl SpawnDescriptor {
    pub fn is_soft_sync(&self) -> bool {
        matches!(self, SpawnDescriptor::SoftSync { .. })
    }

    /// Encode per the server-wide sync mode.
    ///
    /// Prefab mode writes only the hash; otherwise a bool discriminator
    /// (true = soft sync) precedes the id.
    pub fn encode(&self, writer: &mut PackedWriter, use_prefab_sync: bool) -> Result<()> {
        match (use_prefab_sync, self) {
            (true, SpawnDescriptor::Prefab { prefab_hash }) => {
                writer.write_u64_packed(*prefab_hash);
            }
            (true, SpawnDescriptor::SoftSync { .. }) => return Err(Error::DescriptorModeMismatch),
            (false, SpawnDescriptor::SoftSync { instance_id }) => {
                writer.write_bool(true);
                writer.write_u64_packed(*instance_id);
            }
            (false, SpawnDescriptor::Prefab { prefab_hash }) => {
                writer.write_bool(false);
                writer.write_u64_packed(*prefab_hash);
            }
        }
        Ok(())
    }

    pub fn decode(
        reader: &mut PackedReader<'_>,
        use_prefab_sync: bool,
    ) -> std::result::Result<Self, CodecError> {
        if use_prefab_sync {
            return Ok(SpawnDescriptor::Prefab {
                prefab_hash: reader.read_u64_packed()?,
            });
        }
        if reader.read_bool()? {
            Ok(SpawnDescriptor::SoftSync {
                instance_id: reader.read_u64_packed()?,
            })
        } else {
            Ok(SpawnDescriptor::Prefab {
                prefab_hash: reader.read_u64_packed()?,
            })
        }
    }
}

// =============================================================================
// OBJECT SPAWN
// =============================================================================

/// Wire description of one replicated object
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObjectSpawn {
    pub is_player_object: bool,
    pub network_id: NetworkId,
    pub owner: PeerId,
    pub is_scene_object: bool,
    pub descriptor: SpawnDescriptor,
    pub pose: Pose,
}

impl ObjectSpawn {
    pub fn encode(&self, writer: &mut PackedWriter, use_prefab_sync: bool) -> Result<()> {
        writer.write_bool(self.is_player_object);
        writer.write_u64_packed(self.network_id.0);
        writer.write_u32_packed(self.owner.0);
        writer.write_bool(self.is_scene_object);
        self.descriptor.encode(writer, use_prefab_sync)?;
        self.pose.position.encode(writer);
        self.pose.rotation.encode(writer);
        Ok(())
    }

    pub fn decode(
        reader: &mut PackedReader<'_>,
        use_prefab_sync: bool,
    ) -> std::result::Result<Self, CodecError> {
        let is_player_object = reader.read_bool()?;
        let network_id = NetworkId(reader.read_u64_packed()?);
        let owner = PeerId(reader.read_u32_packed()?);
        let is_scene_object = reader.read_bool()?;
        let descriptor = SpawnDescriptor::decode(reader, use_prefab_sync)?;
        let position = Vec3::decode(reader)?;
        let rotation = Vec3::decode(reader)?;
        Ok(Self {
            is_player_object,
            network_id,
            owner,
            is_scene_object,
            descriptor,
            pose: Pose { position, rotation },
        })
    }
}

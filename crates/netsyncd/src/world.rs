//! Application seams
//!
//! The session never touches game objects directly. [`ObjectWorld`] is the
//! local scene graph (instantiate, bind, destroy, notify, invoke) and
//! [`SceneLoader`] runs asynchronous loads and unloads. [`MemoryWorld`] and
//! [`MemoryScenes`] are in-process implementations used by the demo and
//! the tests.

use crate::correlation::RpcValue;
use crate::scene::SceneOpId;
use netsync_core::{hashing, NetworkId, ObjectSpawn, PeerId, Pose, SceneIndex, SpawnDescriptor};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// World errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("prefab {0:#018x} is not registered")]
    UnknownPrefab(u64),
    #[error("no unbound scene object with instance id {0:#018x}")]
    UnknownSceneObject(u64),
    #[error("object {0} does not exist locally")]
    UnknownObject(NetworkId),
    #[error("object {0} has no behaviour {1}")]
    UnknownBehaviour(NetworkId, u16),
    #[error("no handler for method {0:#018x}")]
    UnknownMethod(u64),
    #[error("scene {0} cannot be loaded")]
    UnknownScene(SceneIndex),
}

/// Ownership notifications delivered to an object's behaviours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BehaviourEvent {
    /// Fired before the owner field changes; `owner` is the outgoing owner
    OwnershipLost { owner: PeerId },
    /// Fired after the change; `owner` is the committed new owner
    OwnershipGained { owner: PeerId },
}

/// Scene content present before any network id is assigned
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneObject {
    pub instance_id: u64,
    pub prefab_hash: u64,
    pub pose: Pose,
    pub behaviour_count: u16,
}

/// An RPC addressed to a local behaviour
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcInvocation {
    pub network_id: NetworkId,
    pub behaviour: u16,
    pub method_hash: u64,
    pub sender: PeerId,
    pub args: Vec<u8>,
}

/// Local object graph driven by the session
pub trait ObjectWorld {
    /// Materialise a replicated object; returns its behaviour count.
    ///
    /// Soft-sync descriptors attach to existing scene content, prefab
    /// descriptors instantiate fresh.
    fn instantiate(&mut self, spawn: &ObjectSpawn, payload: Option<&[u8]>) -> Result<u16, WorldError>;

    /// Give untracked scene content a network identity
    fn bind_scene_object(&mut self, instance_id: u64, network_id: NetworkId) -> Result<SceneObject, WorldError>;

    fn destroy(&mut self, network_id: NetworkId);

    /// Scene content in `scene` that has no network identity yet
    fn untracked_scene_objects(&self, scene: SceneIndex) -> Vec<SceneObject>;

    /// Remove untracked scene content (prefab sync: the server's list is
    /// the only truth)
    fn destroy_scene_baseline(&mut self, scene: SceneIndex);

    /// A scene finished loading and its content is fresh
    fn scene_loaded(&mut self, _scene: SceneIndex) {}

    fn move_to_scene(&mut self, network_id: NetworkId, scene: SceneIndex);

    fn notify(&mut self, network_id: NetworkId, event: BehaviourEvent);

    /// Run an RPC; `None` means the method produced no value
    fn invoke_rpc(&mut self, call: &RpcInvocation) -> Result<Option<RpcValue>, WorldError>;

    fn apply_variables(
        &mut self,
        network_id: NetworkId,
        behaviour: u16,
        sender: PeerId,
        data: &[u8],
        full: bool,
    ) -> Result<(), WorldError>;
}

/// Asynchronous scene loading
pub trait SceneLoader {
    fn active_scene(&self) -> SceneIndex;

    /// Start loading `scene` additively; completion is reported by
    /// [`SceneLoader::poll_complete`] and makes it the active scene
    fn begin_load(&mut self, op: SceneOpId, scene: SceneIndex) -> Result<(), WorldError>;

    fn begin_unload(&mut self, op: SceneOpId, scene: SceneIndex) -> Result<(), WorldError>;

    fn poll_complete(&mut self) -> Option<SceneOpId>;
}

// =============================================================================
// IN-MEMORY WORLD
// =============================================================================

#[derive(Clone, Debug)]
struct ContentSlot {
    object: SceneObject,
    bound: Option<NetworkId>,
    present: bool,
}

/// A spawned (network-tracked) object
#[derive(Clone, Debug, PartialEq)]
pub struct LocalObject {
    pub spawn: ObjectSpawn,
    pub behaviour_count: u16,
    pub scene: Option<SceneIndex>,
    pub payload: Option<Vec<u8>>,
}

/// Recorded variable write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarWrite {
    pub network_id: NetworkId,
    pub behaviour: u16,
    pub sender: PeerId,
    pub data: Vec<u8>,
    pub full: bool,
}

type RpcHandler = Box<dyn FnMut(&RpcInvocation) -> Option<RpcValue> + Send>;

/// In-process [`ObjectWorld`] with logs for every side effect
#[derive(Default)]
pub struct MemoryWorld {
    prefabs: HashMap<u64, u16>,
    content: BTreeMap<SceneIndex, Vec<ContentSlot>>,
    objects: BTreeMap<NetworkId, LocalObject>,
    rpcs: HashMap<u64, RpcHandler>,
    pub notifications: Vec<(NetworkId, BehaviourEvent)>,
    pub rpc_log: Vec<RpcInvocation>,
    pub var_log: Vec<VarWrite>,
    pub moved: Vec<(NetworkId, SceneIndex)>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefab(mut self, name: &str, behaviours: u16) -> Self {
        self.prefabs.insert(hashing::prefab_hash(name), behaviours);
        self
    }

    /// Place content in a scene; its instance id derives from the scene and
    /// object names so every peer computes the same one
    pub fn with_scene_object(
        mut self,
        scene: SceneIndex,
        scene_name: &str,
        object_name: &str,
        prefab: &str,
        behaviours: u16,
    ) -> Self {
        let object = SceneObject {
            instance_id: hashing::scene_content_instance_id(scene_name, object_name),
            prefab_hash: hashing::prefab_hash(prefab),
            pose: Pose::default(),
            behaviour_count: behaviours,
        };
        self.prefabs.entry(object.prefab_hash).or_insert(behaviours);
        self.content.entry(scene).or_default().push(ContentSlot {
            object,
            bound: None,
            present: true,
        });
        self
    }

    /// Handle calls to `method` (by name) on any object
    pub fn register_rpc<F>(&mut self, method: &str, handler: F)
    where
        F: FnMut(&RpcInvocation) -> Option<RpcValue> + Send + 'static,
    {
        self.rpcs.insert(hashing::method_hash(method), Box::new(handler));
    }

    pub fn object(&self, id: NetworkId) -> Option<&LocalObject> {
        self.objects.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether the content with `instance_id` is bound to a network id
    pub fn bound_id(&self, instance_id: u64) -> Option<NetworkId> {
        self.slots().find(|s| s.object.instance_id == instance_id).and_then(|s| s.bound)
    }

    /// Whether the content with `instance_id` still exists
    pub fn has_content(&self, instance_id: u64) -> bool {
        self.slots().any(|s| s.object.instance_id == instance_id && s.present)
    }

    fn slots(&self) -> impl Iterator<Item = &ContentSlot> {
        self.content.values().flatten()
    }

    fn unbound_slot(&mut self, instance_id: u64) -> Option<&mut ContentSlot> {
        self.content
            .values_mut()
            .flatten()
            .find(|s| s.object.instance_id == instance_id && s.present && s.bound.is_none())
    }

    fn scene_of(&self, instance_id: u64) -> Option<SceneIndex> {
        self.content
            .iter()
            .find(|(_, slots)| slots.iter().any(|s| s.object.instance_id == instance_id))
            .map(|(scene, _)| *scene)
    }

    fn check_behaviour(&self, id: NetworkId, behaviour: u16) -> Result<(), WorldError> {
        let object = self.objects.get(&id).ok_or(WorldError::UnknownObject(id))?;
        if behaviour >= object.behaviour_count {
            return Err(WorldError::UnknownBehaviour(id, behaviour));
        }
        Ok(())
    }
}

impl ObjectWorld for MemoryWorld {
    fn instantiate(&mut self, spawn: &ObjectSpawn, payload: Option<&[u8]>) -> Result<u16, WorldError> {
        let (behaviour_count, scene) = match spawn.descriptor {
            SpawnDescriptor::SoftSync { instance_id } => {
                let slot = self
                    .unbound_slot(instance_id)
                    .ok_or(WorldError::UnknownSceneObject(instance_id))?;
                slot.bound = Some(spawn.network_id);
                let count = slot.object.behaviour_count;
                (count, self.scene_of(instance_id))
            }
            SpawnDescriptor::Prefab { prefab_hash } => {
                let count = *self
                    .prefabs
                    .get(&prefab_hash)
                    .ok_or(WorldError::UnknownPrefab(prefab_hash))?;
                (count, None)
            }
        };
        self.objects.insert(
            spawn.network_id,
            LocalObject {
                spawn: *spawn,
                behaviour_count,
                scene,
                payload: payload.map(<[u8]>::to_vec),
            },
        );
        Ok(behaviour_count)
    }

    fn bind_scene_object(&mut self, instance_id: u64, network_id: NetworkId) -> Result<SceneObject, WorldError> {
        let scene = self.scene_of(instance_id);
        let slot = self
            .unbound_slot(instance_id)
            .ok_or(WorldError::UnknownSceneObject(instance_id))?;
        slot.bound = Some(network_id);
        let object = slot.object;
        self.objects.insert(
            network_id,
            LocalObject {
                spawn: ObjectSpawn {
                    is_player_object: false,
                    network_id,
                    owner: PeerId::SERVER,
                    is_scene_object: true,
                    descriptor: SpawnDescriptor::SoftSync { instance_id },
                    pose: object.pose,
                },
                behaviour_count: object.behaviour_count,
                scene,
                payload: None,
            },
        );
        Ok(object)
    }

    fn destroy(&mut self, network_id: NetworkId) {
        if self.objects.remove(&network_id).is_none() {
            return;
        }
        for slot in self.content.values_mut().flatten() {
            if slot.bound == Some(network_id) {
                slot.present = false;
                slot.bound = None;
            }
        }
    }

    fn untracked_scene_objects(&self, scene: SceneIndex) -> Vec<SceneObject> {
        self.content
            .get(&scene)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|s| s.present && s.bound.is_none())
                    .map(|s| s.object)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn destroy_scene_baseline(&mut self, scene: SceneIndex) {
        if let Some(slots) = self.content.get_mut(&scene) {
            for slot in slots.iter_mut().filter(|s| s.bound.is_none()) {
                slot.present = false;
            }
        }
    }

    fn scene_loaded(&mut self, scene: SceneIndex) {
        if let Some(slots) = self.content.get_mut(&scene) {
            for slot in slots.iter_mut().filter(|s| s.bound.is_none()) {
                slot.present = true;
            }
        }
    }

    fn move_to_scene(&mut self, network_id: NetworkId, scene: SceneIndex) {
        if let Some(object) = self.objects.get_mut(&network_id) {
            object.scene = Some(scene);
            self.moved.push((network_id, scene));
        }
    }

    fn notify(&mut self, network_id: NetworkId, event: BehaviourEvent) {
        self.notifications.push((network_id, event));
    }

    fn invoke_rpc(&mut self, call: &RpcInvocation) -> Result<Option<RpcValue>, WorldError> {
        self.check_behaviour(call.network_id, call.behaviour)?;
        let handler = self
            .rpcs
            .get_mut(&call.method_hash)
            .ok_or(WorldError::UnknownMethod(call.method_hash))?;
        let result = handler(call);
        self.rpc_log.push(call.clone());
        Ok(result)
    }

    fn apply_variables(
        &mut self,
        network_id: NetworkId,
        behaviour: u16,
        sender: PeerId,
        data: &[u8],
        full: bool,
    ) -> Result<(), WorldError> {
        self.check_behaviour(network_id, behaviour)?;
        self.var_log.push(VarWrite {
            network_id,
            behaviour,
            sender,
            data: data.to_vec(),
            full,
        });
        Ok(())
    }
}

impl fmt::Debug for MemoryWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWorld")
            .field("prefabs", &self.prefabs.len())
            .field("objects", &self.objects.len())
            .field("rpcs", &self.rpcs.len())
            .finish()
    }
}

// =============================================================================
// IN-MEMORY SCENES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpKind {
    Load,
    Unload,
}

/// In-process [`SceneLoader`]; operations complete in FIFO order, one per
/// poll, unless held
#[derive(Debug)]
pub struct MemoryScenes {
    active: SceneIndex,
    scene_count: u32,
    pending: VecDeque<(SceneOpId, OpKind, SceneIndex)>,
    held: bool,
}

impl MemoryScenes {
    pub fn new(initial: SceneIndex, scene_count: u32) -> Self {
        Self {
            active: initial,
            scene_count,
            pending: VecDeque::new(),
            held: false,
        }
    }

    /// Hold completions so a switch stays in flight
    pub fn set_held(&mut self, held: bool) {
        self.held = held;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn check(&self, scene: SceneIndex) -> Result<(), WorldError> {
        if scene.0 >= self.scene_count {
            return Err(WorldError::UnknownScene(scene));
        }
        Ok(())
    }
}

impl SceneLoader for MemoryScenes {
    fn active_scene(&self) -> SceneIndex {
        self.active
    }

    fn begin_load(&mut self, op: SceneOpId, scene: SceneIndex) -> Result<(), WorldError> {
        self.check(scene)?;
        self.pending.push_back((op, OpKind::Load, scene));
        Ok(())
    }

    fn begin_unload(&mut self, op: SceneOpId, scene: SceneIndex) -> Result<(), WorldError> {
        self.check(scene)?;
        self.pending.push_back((op, OpKind::Unload, scene));
        Ok(())
    }

    fn poll_complete(&mut self) -> Option<SceneOpId> {
        if self.held {
            return None;
        }
        let (op, kind, scene) = self.pending.pop_front()?;
        if kind == OpKind::Load {
            self.active = scene;
        }
        debug!("scene operation {:?} ({:?} {}) complete", op, kind, scene);
        Some(op)
    }
}

//! Registry of replicated objects
//!
//! Keyed by [`NetworkId`]; iteration order is id order, which is also the
//! order of the join snapshot.

use netsync_core::{NetworkId, ObjectSpawn, PeerId, Pose, SpawnDescriptor};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("network id {0} is already registered")]
    DuplicateNetworkId(NetworkId),
    #[error("object {0} is not registered")]
    UnknownObject(NetworkId),
}

/// One live replicated object
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkObjectRecord {
    pub network_id: NetworkId,
    pub owner: PeerId,
    pub descriptor: SpawnDescriptor,
    pub is_scene_object: bool,
    pub is_player_object: bool,
    pub pose: Pose,
    /// Behaviours are addressed by order index `0..behaviour_count`
    pub behaviour_count: u16,
}

impl NetworkObjectRecord {
    pub fn from_spawn(spawn: &ObjectSpawn, behaviour_count: u16) -> Self {
        Self {
            network_id: spawn.network_id,
            owner: spawn.owner,
            descriptor: spawn.descriptor,
            is_scene_object: spawn.is_scene_object,
            is_player_object: spawn.is_player_object,
            pose: spawn.pose,
            behaviour_count,
        }
    }

    pub fn to_spawn(&self) -> ObjectSpawn {
        ObjectSpawn {
            is_player_object: self.is_player_object,
            network_id: self.network_id,
            owner: self.owner,
            is_scene_object: self.is_scene_object,
            descriptor: self.descriptor,
            pose: self.pose,
        }
    }

    pub fn has_behaviour(&self, index: u16) -> bool {
        index < self.behaviour_count
    }
}

/// Live object table
#[derive(Debug, Default)]
pub struct Registry {
    objects: BTreeMap<NetworkId, NetworkObjectRecord>,
    next_id: u64,
    /// Soft-sync bindings waiting for their scene to load
    deferred_soft_sync: HashMap<u64, NetworkId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 1,
            deferred_soft_sync: HashMap::new(),
        }
    }

    /// Fresh id, unique among live objects
    pub fn allocate_network_id(&mut self) -> NetworkId {
        loop {
            let id = NetworkId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.objects.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, record: NetworkObjectRecord) -> Result<(), RegistryError> {
        let id = record.network_id;
        if self.objects.contains_key(&id) {
            return Err(RegistryError::DuplicateNetworkId(id));
        }
        if id.0 >= self.next_id {
            self.next_id = id.0.wrapping_add(1).max(1);
        }
        self.objects.insert(id, record);
        Ok(())
    }

    /// Remove an object; absent ids are fine
    pub fn remove(&mut self, id: NetworkId) -> Option<NetworkObjectRecord> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: NetworkId) -> Option<&NetworkObjectRecord> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: NetworkId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkObjectRecord> {
        self.objects.values()
    }

    /// Spawn records for every live object, in id order
    pub fn snapshot(&self) -> Vec<ObjectSpawn> {
        self.objects.values().map(NetworkObjectRecord::to_spawn).collect()
    }

    /// Commit a new owner; returns the previous one
    pub fn set_owner(&mut self, id: NetworkId, owner: PeerId) -> Option<PeerId> {
        self.objects
            .get_mut(&id)
            .map(|record| std::mem::replace(&mut record.owner, owner))
    }

    pub fn owned_by(&self, peer: PeerId) -> Vec<NetworkId> {
        self.objects
            .values()
            .filter(|r| r.owner == peer)
            .map(|r| r.network_id)
            .collect()
    }

    pub fn scene_object_ids(&self) -> Vec<NetworkId> {
        self.objects
            .values()
            .filter(|r| r.is_scene_object)
            .map(|r| r.network_id)
            .collect()
    }

    /// Objects that survive a scene switch
    pub fn persistent_object_ids(&self) -> Vec<NetworkId> {
        self.objects
            .values()
            .filter(|r| !r.is_scene_object)
            .map(|r| r.network_id)
            .collect()
    }

    pub fn defer_soft_sync(&mut self, instance_id: u64, network_id: NetworkId) {
        self.deferred_soft_sync.insert(instance_id, network_id);
    }

    pub fn take_deferred_soft_sync(&mut self) -> HashMap<u64, NetworkId> {
        std::mem::take(&mut self.deferred_soft_sync)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.deferred_soft_sync.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_core::Vec3;

    fn record(id: u64, owner: PeerId, scene: bool) -> NetworkObjectRecord {
        NetworkObjectRecord {
            network_id: NetworkId(id),
            owner,
            descriptor: if scene {
                SpawnDescriptor::SoftSync { instance_id: id * 10 }
            } else {
                SpawnDescriptor::Prefab { prefab_hash: 7 }
            },
            is_scene_object: scene,
            is_player_object: false,
            pose: Pose::at(Vec3::new(id as f32, 0.0, 0.0)),
            behaviour_count: 2,
        }
    }

    #[test]
    fn test_insert_and_duplicate() {
        let mut registry = Registry::new();
        let id = registry.allocate_network_id();
        let mut rec = record(0, PeerId::SERVER, false);
        rec.network_id = id;
        registry.insert(rec.clone()).unwrap();
        assert_eq!(
            registry.insert(rec).unwrap_err(),
            RegistryError::DuplicateNetworkId(id)
        );
        assert_ne!(registry.allocate_network_id(), id);
    }

    #[test]
    fn test_allocation_skips_inserted_ids() {
        let mut registry = Registry::new();
        registry.insert(record(1, PeerId::SERVER, false)).unwrap();
        registry.insert(record(5, PeerId::SERVER, false)).unwrap();
        assert_eq!(registry.allocate_network_id(), NetworkId(6));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        registry.insert(record(3, PeerId::SERVER, false)).unwrap();
        assert!(registry.remove(NetworkId(3)).is_some());
        assert!(registry.remove(NetworkId(3)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_in_id_order() {
        let mut registry = Registry::new();
        registry.insert(record(9, PeerId(1), false)).unwrap();
        registry.insert(record(2, PeerId::SERVER, true)).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].network_id, NetworkId(2));
        assert_eq!(snapshot[1], record(9, PeerId(1), false).to_spawn());
    }

    #[test]
    fn test_queries() {
        let mut registry = Registry::new();
        registry.insert(record(1, PeerId(4), false)).unwrap();
        registry.insert(record(2, PeerId::SERVER, true)).unwrap();
        registry.insert(record(3, PeerId(4), true)).unwrap();

        assert_eq!(registry.owned_by(PeerId(4)), vec![NetworkId(1), NetworkId(3)]);
        assert_eq!(registry.scene_object_ids(), vec![NetworkId(2), NetworkId(3)]);
        assert_eq!(registry.persistent_object_ids(), vec![NetworkId(1)]);

        assert_eq!(registry.set_owner(NetworkId(1), PeerId(5)), Some(PeerId(4)));
        assert_eq!(registry.get(NetworkId(1)).map(|r| r.owner), Some(PeerId(5)));
        assert_eq!(registry.set_owner(NetworkId(42), PeerId(5)), None);
    }

    #[test]
    fn test_deferred_soft_sync() {
        let mut registry = Registry::new();
        registry.defer_soft_sync(100, NetworkId(1));
        registry.defer_soft_sync(101, NetworkId(2));
        let lookup = registry.take_deferred_soft_sync();
        assert_eq!(lookup.get(&100), Some(&NetworkId(1)));
        assert!(registry.take_deferred_soft_sync().is_empty());
    }
}

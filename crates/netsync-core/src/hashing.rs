//! Hash derivations for netsync
//!
//! All derivations use BLAKE3 with domain separation prefixes and are
//! truncated to 64 bits where the wire carries a `u64`.

use blake3::Hasher;

// =============================================================================
// DOMAIN SEPARATION PREFIXES
// =============================================================================

/// Domain prefix for the configuration compatibility hash
pub const DOMAIN_CONFIG: &[u8] = b"netsync-config";
/// Domain prefix for prefab hashes
pub const DOMAIN_PREFAB: &[u8] = b"netsync-prefab";
/// Domain prefix for RPC method hashes
pub const DOMAIN_METHOD: &[u8] = b"netsync-method";
/// Domain prefix for scene content instance ids
pub const DOMAIN_INSTANCE: &[u8] = b"netsync-instance";

fn truncate(hasher: &Hasher) -> u64 {
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// `config_hash = BLAKE3("netsync-config" || canonical_bytes)[..8]`
pub fn config_hash(canonical_bytes: &[u8]) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_CONFIG);
    hasher.update(canonical_bytes);
    truncate(&hasher)
}

/// Stable hash of a registered prefab name
pub fn prefab_hash(name: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_PREFAB);
    hasher.update(name.as_bytes());
    truncate(&hasher)
}

/// Stable hash identifying an RPC method
pub fn method_hash(name: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_METHOD);
    hasher.update(name.as_bytes());
    truncate(&hasher)
}

/// Instance id for named content authored into a scene.
///
/// Every peer loading the same scene derives the same id, which is what
/// soft sync matches against.
pub fn scene_content_instance_id(scene: &str, object: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_INSTANCE);
    hasher.update(scene.as_bytes());
    hasher.update(&[0]);
    hasher.update(object.as_bytes());
    truncate(&hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_are_separated() {
        assert_ne!(prefab_hash("Player"), method_hash("Player"));
        assert_eq!(prefab_hash("Player"), prefab_hash("Player"));
    }

    #[test]
    fn test_instance_ids_are_scene_scoped() {
        let a = scene_content_instance_id("Lobby", "Door");
        let b = scene_content_instance_id("Arena", "Door");
        assert_ne!(a, b);
        // separator keeps ("ab","c") distinct from ("a","bc")
        assert_ne!(
            scene_content_instance_id("ab", "c"),
            scene_content_instance_id("a", "bc")
        );
    }
}

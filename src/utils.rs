use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::protos::gossip::v1::Member;

/// Generate a registry id for a consensus check.
pub fn generate_check_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Order-independent fingerprint of a member id set.
///
/// Ids are sorted and deduplicated before hashing, so every node computes the
/// same value for the same membership regardless of iteration order. The first
/// eight digest bytes are folded into a `u64`. SHA-256 keeps the value stable
/// across processes and platforms, which `std::hash` hashers do not guarantee.
pub fn topology_hash(member_ids: &[&str]) -> u64 {
    let mut ids: Vec<&str> = member_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(prefix)
}

/// [`topology_hash`] over the ids of `members`.
pub fn members_topology_hash(members: &[Member]) -> u64 {
    let ids: Vec<&str> = members.iter().map(|member| member.id.as_str()).collect();
    topology_hash(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_hash_is_order_independent() {
        let forward = topology_hash(&["alpha", "beta", "gamma"]);
        let reversed = topology_hash(&["gamma", "beta", "alpha"]);
        let shuffled = topology_hash(&["beta", "gamma", "alpha"]);

        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn topology_hash_ignores_duplicate_ids() {
        let plain = topology_hash(&["alpha", "beta"]);
        let duplicated = topology_hash(&["alpha", "beta", "alpha"]);

        assert_eq!(plain, duplicated);
    }

    #[test]
    fn topology_hash_differs_for_different_sets() {
        let two = topology_hash(&["alpha", "beta"]);
        let three = topology_hash(&["alpha", "beta", "gamma"]);

        assert_ne!(two, three);
    }

    #[test]
    fn topology_hash_distinguishes_id_boundaries() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(topology_hash(&["ab", "c"]), topology_hash(&["a", "bc"]));
    }

    #[test]
    fn members_topology_hash_matches_id_hash() {
        let members = vec![
            Member {
                id: "node-1".to_string(),
                address: "10.0.0.1:4020".to_string(),
                kinds: vec![],
            },
            Member {
                id: "node-2".to_string(),
                address: "10.0.0.2:4020".to_string(),
                kinds: vec![],
            },
        ];

        assert_eq!(
            members_topology_hash(&members),
            topology_hash(&["node-1", "node-2"])
        );
    }
}

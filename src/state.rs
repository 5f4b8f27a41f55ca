//! Pure merge and update logic over [`GossipState`].
//!
//! Conflict resolution is last-writer-wins by sequence number, never by
//! wall-clock time. All functions here are synchronous and lock-free; the
//! engine serializes calls through its own store lock.

use std::collections::HashMap;

use crate::{
    protos::gossip::v1::{GossipKeyValue, GossipState},
    types::GossipUpdate,
};

/// Merge `remote` into `local`, keeping the higher sequence number per
/// (member, key) entry. Returns one record per entry that changed.
///
/// Merging is idempotent and commutative: replaying a delta, or applying two
/// deltas in either order, yields the same state. Entries for member ids not
/// present in `local` create new member state; membership validity is the
/// external membership source's concern.
pub fn merge_state(local: &mut GossipState, remote: GossipState) -> Vec<GossipUpdate> {
    let mut updates = Vec::new();

    for (member_id, remote_member) in remote.members {
        let local_member = local.members.entry(member_id.clone()).or_default();

        for (key, remote_value) in remote_member.values {
            let keep_local = local_member
                .values
                .get(&key)
                .is_some_and(|local_value| {
                    local_value.sequence_number >= remote_value.sequence_number
                });
            if keep_local {
                continue;
            }

            updates.push(GossipUpdate {
                member_id: member_id.clone(),
                key: key.clone(),
                value: remote_value.value.clone(),
                sequence_number: remote_value.sequence_number,
            });
            local_member.values.insert(key, remote_value);
        }
    }

    updates
}

/// Write `value` under (`member_id`, `key`), stamping it with the next value
/// of the node-wide counter `sequence_no`. Returns the sequence used.
pub fn set_key(
    state: &mut GossipState,
    member_id: &str,
    key: &str,
    value: Vec<u8>,
    sequence_no: &mut u64,
) -> u64 {
    *sequence_no += 1;
    let member_state = state.members.entry(member_id.to_string()).or_default();
    member_state.values.insert(
        key.to_string(),
        GossipKeyValue {
            sequence_number: *sequence_no,
            value,
        },
    );
    *sequence_no
}

/// Current entry under `key` for every member that carries it.
pub fn state_for_key(state: &GossipState, key: &str) -> HashMap<String, GossipKeyValue> {
    state
        .members
        .iter()
        .filter_map(|(member_id, member_state)| {
            member_state
                .values
                .get(key)
                .map(|value| (member_id.clone(), value.clone()))
        })
        .collect()
}

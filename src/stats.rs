use crate::gossip::Gossip;

/// Point-in-time counters describing an engine's internal state.
#[derive(Debug, Clone)]
pub struct GossipStats {
    /// How many members the engine currently considers part of the cluster,
    /// itself included.
    pub known_members: usize,
    /// How many members have at least one entry in the local store. Can
    /// exceed `known_members` when departed members' state lingers.
    pub state_members: usize,
    /// Total (member, key) entries in the local store.
    pub state_entries: usize,
    /// Number of `"{target}.{member}"` watermarks recorded from committed
    /// deltas.
    pub committed_offsets: usize,
    /// Consensus checks currently registered.
    pub active_checks: usize,
    /// The node-wide write counter, equal to the number of local sets so far.
    pub local_sequence_number: u64,
}

impl Gossip {
    /// Snapshot the engine's counters.
    ///
    /// Useful for monitoring and for asserting on engine behavior in tests.
    pub fn stats(&self) -> GossipStats {
        let (known_members, state_members, state_entries, local_sequence_number) = {
            let core = self.core.read();
            (
                core.active_member_ids.len(),
                core.state.members.len(),
                core.state
                    .members
                    .values()
                    .map(|member| member.values.len())
                    .sum(),
                core.local_sequence_no,
            )
        };

        GossipStats {
            known_members,
            state_members,
            state_entries,
            committed_offsets: self.committed_offsets.lock().len(),
            active_checks: self.checks.read().len(),
            local_sequence_number,
        }
    }
}

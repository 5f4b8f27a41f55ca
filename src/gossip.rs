//! The gossip engine: versioned per-member key/value state, delta
//! construction for peers, and merge of incoming remote state.
//!
//! The engine never touches the network. Callers hand it a send function per
//! round ([`Gossip::send_state`]) and feed received payloads back in
//! ([`Gossip::receive_state`]); [`crate::gossiper::Gossiper`] wraps this in a
//! periodic loop for the common case.

use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use prost::Message;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::debug;

use crate::{
    consensus::ConsensusChecks,
    protos::gossip::v1::{ClusterTopology, GossipKeyValue, GossipMemberState, GossipState, Member},
    state,
    types::{BlockedMembersSupplier, GossipContext, GossipUpdate, MemberStateDelta},
};

/// Key under which every member publishes the cluster topology it sees.
pub const TOPOLOGY_KEY: &str = "topology";
/// Key under which every member publishes its liveness heartbeat.
pub const HEARTBEAT_KEY: &str = "heartbeat";

/// Everything guarded by the engine's store lock. The RNG lives here so that
/// peer selection needs no lock of its own.
pub(crate) struct GossipCore {
    pub(crate) state: GossipState,
    /// Node-wide write counter; every local set gets the next value,
    /// regardless of key.
    pub(crate) local_sequence_no: u64,
    /// Bumped inside every mutating critical section. Consensus snapshots
    /// carry it so checks can apply outcomes in store order.
    pub(crate) generation: u64,
    /// Known members excluding the local one; the send candidate pool.
    pub(crate) other_members: Vec<Member>,
    /// Ids of all currently known members, local member included. Consensus
    /// is evaluated against exactly this set.
    pub(crate) active_member_ids: HashSet<String>,
    pub(crate) rng: StdRng,
}

/// Gossip state engine for one cluster member.
///
/// All methods take `&self`; the engine is safe to share behind an [`Arc`]
/// and call from multiple tasks.
pub struct Gossip {
    ctx: GossipContext,
    fanout: usize,
    max_send: usize,
    get_blocked: BlockedMembersSupplier,
    pub(crate) core: RwLock<GossipCore>,
    /// Highest sequence number per `"{target}.{member}"` pair that the
    /// target has acknowledged. Only ever raised, and only through a delta's
    /// commit.
    pub(crate) committed_offsets: Arc<Mutex<HashMap<String, u64>>>,
    pub(crate) checks: Arc<RwLock<ConsensusChecks>>,
}

impl Gossip {
    pub fn new(
        ctx: GossipContext,
        fanout: usize,
        max_send: usize,
        get_blocked: BlockedMembersSupplier,
    ) -> Self {
        Self {
            ctx,
            fanout,
            max_send,
            get_blocked,
            core: RwLock::new(GossipCore {
                state: GossipState::default(),
                local_sequence_no: 0,
                generation: 0,
                other_members: Vec::new(),
                active_member_ids: HashSet::new(),
                rng: StdRng::from_entropy(),
            }),
            committed_offsets: Arc::new(Mutex::new(HashMap::new())),
            checks: Arc::new(RwLock::new(ConsensusChecks::default())),
        }
    }

    pub fn ctx(&self) -> &GossipContext {
        &self.ctx
    }

    /// Replace the engine's view of cluster membership and publish the
    /// topology under [`TOPOLOGY_KEY`] as this member's own state.
    ///
    /// `topology.members` must be the complete member list, the local member
    /// included. Members no longer listed stop being gossip targets, and
    /// consensus checks are re-evaluated against the new member set.
    pub fn update_cluster_topology(&self, topology: ClusterTopology) {
        {
            let mut core = self.core.write();
            core.other_members = topology
                .members
                .iter()
                .filter(|member| member.id != self.ctx.member_id())
                .cloned()
                .collect();
            core.active_member_ids = topology
                .members
                .iter()
                .map(|member| member.id.clone())
                .collect();
            core.generation += 1;
        }
        self.set_state(TOPOLOGY_KEY, &topology);
    }

    /// Write `message` under `key` in the local member's state, stamped with
    /// the next node-wide sequence number.
    ///
    /// Local writes re-run affected consensus checks but do not publish
    /// update events; those are reserved for remotely merged entries.
    pub fn set_state<M: Message>(&self, key: &str, message: &M) {
        let sequence_no = {
            let mut guard = self.core.write();
            let core = &mut *guard;
            core.generation += 1;
            state::set_key(
                &mut core.state,
                self.ctx.member_id(),
                key,
                message.encode_to_vec(),
                &mut core.local_sequence_no,
            )
        };
        let member_id = self.ctx.member_id();
        debug!("Member {member_id} set gossip key {key} at sequence {sequence_no}");
        self.run_affected_checks(&HashSet::from([key.to_string()]));
    }

    /// Merge remote state into the local store.
    ///
    /// Returns one [`GossipUpdate`] per entry that actually changed, after
    /// publishing each on the update topic and re-running affected consensus
    /// checks. Replaying the same state is harmless and yields no updates.
    pub fn receive_state(&self, remote_state: GossipState) -> Vec<GossipUpdate> {
        let updates = {
            let mut core = self.core.write();
            let updates = state::merge_state(&mut core.state, remote_state);
            if !updates.is_empty() {
                core.generation += 1;
            }
            updates
        };
        if updates.is_empty() {
            return updates;
        }

        let mut updated_keys = HashSet::new();
        for update in &updates {
            self.ctx.events().publish_update(update.clone());
            updated_keys.insert(update.key.clone());
        }
        self.run_affected_checks(&updated_keys);
        updates
    }

    /// Run one gossip round: pick up to `fanout` unblocked peers at random
    /// and invoke `send` with each one's delta.
    ///
    /// Peers that are already fully up to date are skipped. The callback (or
    /// whoever it hands the delta to) decides whether the exchange succeeded
    /// and calls [`MemberStateDelta::commit_offsets`] only then; an
    /// uncommitted delta is rebuilt in full next round.
    pub fn send_state(&self, mut send: impl FnMut(MemberStateDelta, &Member, &GossipContext)) {
        let blocked = (self.get_blocked)();
        let targets: Vec<Member> = {
            let mut guard = self.core.write();
            let core = &mut *guard;
            let candidates: Vec<&Member> = core
                .other_members
                .iter()
                .filter(|member| !blocked.contains(&member.id))
                .collect();
            candidates
                .choose_multiple(&mut core.rng, self.fanout)
                .map(|member| (*member).clone())
                .collect()
        };

        for target in targets {
            let delta = self.member_state_delta(&target.id);
            if !delta.has_state {
                continue;
            }
            send(delta, &target, &self.ctx);
        }
    }

    /// Build the delta of everything `target_member_id` has not yet
    /// acknowledged, bounded to `max_send` members' state.
    ///
    /// The local member's own state is offered first, then other members
    /// ordered by freshest entry, so a bounded delta still carries the most
    /// recent news. The returned delta owns the offset advance for exactly
    /// the entries it carries; nothing moves until it is committed.
    pub fn member_state_delta(&self, target_member_id: &str) -> MemberStateDelta {
        let offsets = self.committed_offsets.lock().clone();
        let core = self.core.read();

        let mut member_ids: Vec<&String> = core.state.members.keys().collect();
        member_ids.sort_by_key(|id| {
            let newest = core.state.members[*id]
                .values
                .values()
                .map(|entry| entry.sequence_number)
                .max()
                .unwrap_or(0);
            let own = if id.as_str() == self.ctx.member_id() {
                0u8
            } else {
                1
            };
            (own, Reverse(newest))
        });

        let mut delta_state = GossipState::default();
        let mut pending: HashMap<String, u64> = HashMap::new();

        for member_id in member_ids {
            if delta_state.members.len() >= self.max_send {
                break;
            }

            let watermark_key = format!("{target_member_id}.{member_id}");
            let watermark = offsets.get(&watermark_key).copied().unwrap_or(0);
            let mut new_watermark = watermark;

            let mut member_delta = GossipMemberState::default();
            for (key, entry) in &core.state.members[member_id].values {
                if entry.sequence_number <= watermark {
                    continue;
                }
                new_watermark = new_watermark.max(entry.sequence_number);
                member_delta.values.insert(key.clone(), entry.clone());
            }

            if !member_delta.values.is_empty() {
                delta_state.members.insert(member_id.clone(), member_delta);
                pending.insert(watermark_key, new_watermark);
            }
        }
        drop(core);

        let has_state = !delta_state.members.is_empty();
        let committed = Arc::clone(&self.committed_offsets);
        let commit = Box::new(move || {
            let mut offsets = committed.lock();
            for (watermark_key, watermark) in pending {
                let entry = offsets.entry(watermark_key).or_insert(0);
                // A commit never lowers a watermark.
                if watermark > *entry {
                    *entry = watermark;
                }
            }
        });

        MemberStateDelta::new(target_member_id.to_string(), has_state, delta_state, commit)
    }

    /// Current entry under `key` for every member that carries it, encoded
    /// as stored.
    pub fn state_for_key(&self, key: &str) -> HashMap<String, GossipKeyValue> {
        state::state_for_key(&self.core.read().state, key)
    }

    /// Full copy of the local store.
    pub fn state_snapshot(&self) -> GossipState {
        self.core.read().state.clone()
    }

    /// State, member-set and generation snapshot taken under a single lock,
    /// so consensus checks see a consistent triple.
    pub(crate) fn consensus_view(&self) -> (GossipState, HashSet<String>, u64) {
        let core = self.core.read();
        (
            core.state.clone(),
            core.active_member_ids.clone(),
            core.generation,
        )
    }
}

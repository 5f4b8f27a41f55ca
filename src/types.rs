use std::{collections::HashSet, fmt, sync::Arc};

use crate::{events::GossipEvents, protos::gossip::v1::GossipState};

/// One merged entry, published on the update topic after `receive_state`
/// changes local state. Local writes do not produce updates.
#[derive(Debug, Clone, PartialEq)]
pub struct GossipUpdate {
    pub member_id: String,
    pub key: String,
    /// Encoded payload exactly as stored; decode with the key's message type.
    pub value: Vec<u8>,
    pub sequence_number: u64,
}

/// State prepared for one target peer: only entries the peer has not yet
/// acknowledged, plus the commit that advances its acknowledgement offsets.
///
/// The caller invokes [`commit_offsets`](Self::commit_offsets) once it
/// considers the send accepted. A delta that is never committed leaves its
/// entries pending, and the next round rebuilds them in full.
pub struct MemberStateDelta {
    pub target_member_id: String,
    /// False when the target is already up to date; such deltas are not sent.
    pub has_state: bool,
    pub state: GossipState,
    commit: Box<dyn FnOnce() + Send>,
}

impl MemberStateDelta {
    pub(crate) fn new(
        target_member_id: String,
        has_state: bool,
        state: GossipState,
        commit: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            target_member_id,
            has_state,
            state,
            commit,
        }
    }

    /// Mark this delta as delivered, advancing the target's offsets.
    pub fn commit_offsets(self) {
        (self.commit)();
    }
}

impl fmt::Debug for MemberStateDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberStateDelta")
            .field("target_member_id", &self.target_member_id)
            .field("has_state", &self.has_state)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Per-engine context carrying the local member identity and the event bus.
///
/// Passed into the engine at construction and handed to send callbacks,
/// replacing any process-wide ambient state. Cloning shares the same bus.
#[derive(Clone)]
pub struct GossipContext {
    member_id: Arc<str>,
    events: GossipEvents,
}

impl GossipContext {
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: Arc::from(member_id.into()),
            events: GossipEvents::default(),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn events(&self) -> &GossipEvents {
        &self.events
    }
}

impl fmt::Debug for GossipContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GossipContext")
            .field("member_id", &self.member_id)
            .finish_non_exhaustive()
    }
}

/// Supplies the ids of members that must not be gossiped to. Queried once at
/// the start of every send round.
pub type BlockedMembersSupplier = Arc<dyn Fn() -> HashSet<String> + Send + Sync>;

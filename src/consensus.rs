//! Consensus checks: predicates over gossip state that detect when every
//! known member agrees on a derived value.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use prost::Message;

use crate::{
    handle::ConsensusSignal,
    protos::gossip::v1::{GossipKeyValue, GossipState},
};

/// Evaluation callback, invoked with a state snapshot and the ids of all
/// currently known members (local member included). Never invoked under the
/// engine's locks, so it may call back into the engine.
pub type CheckFn = Arc<dyn Fn(&GossipState, &HashSet<String>) + Send + Sync>;

type ExtractFn<T> = Arc<dyn Fn(&GossipKeyValue) -> Option<T> + Send + Sync>;

/// A registered consensus predicate, re-run whenever one of the keys it
/// depends on changes.
#[derive(Clone)]
pub struct ConsensusCheck {
    id: String,
    affected_keys: Vec<String>,
    check: CheckFn,
    /// Highest snapshot generation whose outcome has been applied. Shared
    /// across clones and held while the callback runs.
    applied_generation: Arc<Mutex<u64>>,
}

impl ConsensusCheck {
    pub fn new(id: impl Into<String>, affected_keys: Vec<String>, check: CheckFn) -> Self {
        Self {
            id: id.into(),
            affected_keys,
            check,
            applied_generation: Arc::new(Mutex::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn affected_keys(&self) -> &[String] {
        &self.affected_keys
    }

    /// Run the callback against a snapshot taken at `generation`.
    ///
    /// Evaluations of one check are serialized and applied in generation
    /// order. A snapshot older than the last applied one is dropped, so two
    /// racing merges cannot leave the check latched on the older view.
    pub fn evaluate(&self, generation: u64, state: &GossipState, member_ids: &HashSet<String>) {
        let mut applied = self.applied_generation.lock();
        if generation < *applied {
            return;
        }
        *applied = generation;
        (self.check)(state, member_ids);
    }
}

/// Registry of active checks, indexed by id.
#[derive(Default)]
pub struct ConsensusChecks {
    checks: HashMap<String, ConsensusCheck>,
}

impl ConsensusChecks {
    pub fn add(&mut self, check: ConsensusCheck) {
        self.checks.insert(check.id.clone(), check);
    }

    /// Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &str) {
        self.checks.remove(id);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Clones of every check that depends on at least one of `updated_keys`.
    /// Cloned so callers can release the registry before evaluating.
    pub fn affected_by(&self, updated_keys: &HashSet<String>) -> Vec<ConsensusCheck> {
        self.checks
            .values()
            .filter(|check| {
                check
                    .affected_keys
                    .iter()
                    .any(|key| updated_keys.contains(key))
            })
            .cloned()
            .collect()
    }
}

/// Builds the unanimity predicate over one or more watched keys.
///
/// The derived check agrees iff every known member carries every watched key,
/// every payload decodes, and all extracted values are exactly equal. A
/// member that has not reported breaks consensus; entries from members
/// outside the known set are ignored; an empty member set never agrees.
pub struct ConsensusCheckBuilder<T> {
    extractors: Vec<(String, ExtractFn<T>)>,
}

impl<T> ConsensusCheckBuilder<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Watch `key`, deriving the compared value by decoding each entry as `M`
    /// and applying `extract`.
    pub fn new<M, F>(key: impl Into<String>, extract: F) -> Self
    where
        M: Message + Default,
        F: Fn(&M) -> T + Send + Sync + 'static,
    {
        Self {
            extractors: Vec::new(),
        }
        .in_consensus_with(key, extract)
    }

    /// Additionally require agreement on `key`; its extracted values must
    /// match the other watched keys' values as well.
    pub fn in_consensus_with<M, F>(mut self, key: impl Into<String>, extract: F) -> Self
    where
        M: Message + Default,
        F: Fn(&M) -> T + Send + Sync + 'static,
    {
        let extractor: ExtractFn<T> = Arc::new(move |entry: &GossipKeyValue| {
            M::decode(entry.value.as_slice())
                .ok()
                .map(|message| extract(&message))
        });
        self.extractors.push((key.into(), extractor));
        self
    }

    pub fn affected_keys(&self) -> Vec<String> {
        self.extractors.iter().map(|(key, _)| key.clone()).collect()
    }

    /// The agreed value, or `None` when any known member is missing a watched
    /// key, a payload fails to decode, or two extracted values differ.
    pub fn derive(&self, state: &GossipState, member_ids: &HashSet<String>) -> Option<T> {
        if member_ids.is_empty() {
            return None;
        }

        let mut agreed: Option<T> = None;
        for member_id in member_ids {
            let member_state = state.members.get(member_id)?;
            for (key, extract) in &self.extractors {
                let value = extract(member_state.values.get(key)?)?;
                match &agreed {
                    Some(previous) if *previous != value => return None,
                    Some(_) => {}
                    None => agreed = Some(value),
                }
            }
        }
        agreed
    }

    /// Finish into a registry check that reports every evaluation outcome to
    /// `on_outcome` (`Some` on agreement, `None` otherwise).
    pub fn into_check_with<F>(self, id: impl Into<String>, on_outcome: F) -> ConsensusCheck
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let affected_keys = self.affected_keys();
        let check: CheckFn = Arc::new(move |state, member_ids| {
            on_outcome(self.derive(state, member_ids));
        });
        ConsensusCheck::new(id, affected_keys, check)
    }

    /// Finish into a registry check that drives a handle's signal.
    pub(crate) fn into_check(self, id: String, signal: ConsensusSignal<T>) -> ConsensusCheck {
        self.into_check_with(id, move |outcome| match outcome {
            Some(value) => signal.try_set_consensus(value),
            None => signal.try_reset_consensus(),
        })
    }
}

//! Consensus-check registration and evaluation for [`Gossip`].

use std::{collections::HashSet, sync::Arc};

use prost::Message;

use crate::{
    consensus::{ConsensusCheck, ConsensusCheckBuilder},
    gossip::Gossip,
    handle::{self, ConsensusHandle},
    utils,
};

impl Gossip {
    /// Re-evaluate every check watching at least one of `updated_keys`.
    ///
    /// Evaluation happens on a snapshot, outside the store and registry
    /// locks, so check callbacks may call back into the engine. The snapshot
    /// carries the store generation and each check applies outcomes in
    /// generation order, so a slow evaluation cannot overwrite a newer one.
    pub(crate) fn run_affected_checks(&self, updated_keys: &HashSet<String>) {
        let affected = self.checks.read().affected_by(updated_keys);
        if affected.is_empty() {
            return;
        }

        let (state, member_ids, generation) = self.consensus_view();
        for check in affected {
            check.evaluate(generation, &state, &member_ids);
        }
    }

    /// Register a check that agrees when every known member's entry under
    /// `key` decodes as `M` and `extract` yields the same value for all of
    /// them.
    ///
    /// The check is evaluated once immediately, so in a cluster that is
    /// already unanimous the handle resolves without waiting for gossip.
    /// Dropping the handle unregisters the check.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::{collections::HashSet, sync::Arc, time::Duration};
    ///
    /// use cluster_gossip::{
    ///     gossip::{Gossip, TOPOLOGY_KEY},
    ///     protos::gossip::v1::ClusterTopology,
    ///     types::GossipContext,
    /// };
    ///
    /// async fn example() {
    ///     let gossip = Gossip::new(
    ///         GossipContext::new("member-1"),
    ///         3,
    ///         50,
    ///         Arc::new(|| HashSet::new()),
    ///     );
    ///
    ///     let mut handle = gossip.register_consensus_check(
    ///         TOPOLOGY_KEY,
    ///         |topology: &ClusterTopology| topology.topology_hash,
    ///     );
    ///     let (_reached, _hash) = handle.try_get_consensus(Duration::from_secs(5)).await;
    /// }
    /// ```
    pub fn register_consensus_check<T, M, F>(
        &self,
        key: impl Into<String>,
        extract: F,
    ) -> ConsensusHandle<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        M: Message + Default,
        F: Fn(&M) -> T + Send + Sync + 'static,
    {
        self.register_consensus_check_with(ConsensusCheckBuilder::new(key, extract))
    }

    /// Register a prepared [`ConsensusCheckBuilder`], for checks that span
    /// multiple keys. Same lifecycle as [`register_consensus_check`].
    ///
    /// [`register_consensus_check`]: Self::register_consensus_check
    pub fn register_consensus_check_with<T>(
        &self,
        builder: ConsensusCheckBuilder<T>,
    ) -> ConsensusHandle<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let id = utils::generate_check_id();
        // Weak, so a handle outliving the engine unregisters into nothing.
        let registry = Arc::downgrade(&self.checks);
        let check_id = id.clone();
        let unregister = Box::new(move || {
            if let Some(checks) = registry.upgrade() {
                checks.write().remove(&check_id);
            }
        });

        let (signal, handle) = handle::consensus_channel(unregister);
        self.add_consensus_check(builder.into_check(id, signal));
        handle
    }

    /// Add a check directly. The check is evaluated once against the current
    /// state before this returns.
    pub fn add_consensus_check(&self, check: ConsensusCheck) {
        let evaluate = check.clone();
        self.checks.write().add(check);

        let (state, member_ids, generation) = self.consensus_view();
        evaluate.evaluate(generation, &state, &member_ids);
    }

    /// Remove a check by id. Unknown ids are ignored.
    pub fn remove_consensus_check(&self, id: &str) {
        self.checks.write().remove(id);
    }
}

//! Periodic gossip loop on top of [`Gossip`].
//!
//! The [`Gossiper`] owns an engine, ticks it at a configured interval, and
//! drives each round's deltas through a caller-supplied async send function.
//! Deltas whose send completes within the request timeout are committed;
//! timed-out sends are not, so their entries are offered again next round.

use std::{collections::HashMap, future::Future, sync::Arc};

use futures::future::join_all;
use parking_lot::Mutex;
use prost::Message;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

use crate::{
    config::GossipConfig,
    consensus::ConsensusCheckBuilder,
    error::GossipError,
    gossip::{Gossip, HEARTBEAT_KEY, TOPOLOGY_KEY},
    handle::ConsensusHandle,
    protos::gossip::v1::{ClusterTopology, GossipState, Member, MemberHeartbeat},
    stats::GossipStats,
    types::{BlockedMembersSupplier, GossipContext, GossipUpdate, MemberStateDelta},
};

/// Registry id of the built-in check that publishes topology consensus.
const TOPOLOGY_CONSENSUS_ID: &str = "topology-consensus";

/// Owns a [`Gossip`] engine and gossips it on a timer.
pub struct Gossiper {
    gossip: Arc<Gossip>,
    config: GossipConfig,
    ctx: GossipContext,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Gossiper {
    pub fn new(
        ctx: GossipContext,
        config: GossipConfig,
        get_blocked: BlockedMembersSupplier,
    ) -> Self {
        let gossip = Arc::new(Gossip::new(
            ctx.clone(),
            config.gossip_fanout(),
            config.gossip_max_send(),
            get_blocked,
        ));
        let (shutdown, _) = watch::channel(false);
        Self {
            gossip,
            config,
            ctx,
            loop_task: Mutex::new(None),
            shutdown,
        }
    }

    /// The wrapped engine, for callers that need direct access.
    pub fn gossip(&self) -> &Arc<Gossip> {
        &self.gossip
    }

    pub fn ctx(&self) -> &GossipContext {
        &self.ctx
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Start the gossip loop.
    ///
    /// Every interval the loop refreshes this member's heartbeat, asks the
    /// engine for a round of deltas, and runs `send` for each one with the
    /// configured request timeout. `send` decides delivery: it calls
    /// [`MemberStateDelta::commit_offsets`] once the target has accepted the
    /// payload. A send still pending at the timeout is abandoned uncommitted.
    ///
    /// Also registers the built-in check that publishes [`ClusterTopology`]
    /// on the topology topic whenever the cluster agrees on a new hash.
    ///
    /// Returns [`GossipError::AlreadyStarted`] while a loop is running.
    pub fn start<F, Fut>(&self, send: F) -> Result<(), GossipError>
    where
        F: Fn(MemberStateDelta, Member, GossipContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut loop_task = self.loop_task.lock();
        if loop_task.is_some() {
            return Err(GossipError::AlreadyStarted);
        }

        self.register_topology_publication();

        let gossip = Arc::clone(&self.gossip);
        let ctx = self.ctx.clone();
        let interval = self.config.gossip_interval();
        let request_timeout = self.config.gossip_request_timeout();
        let mut shutdown = self.shutdown.subscribe();
        let send = Arc::new(send);

        *loop_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }

                tick += 1;
                gossip.set_state(HEARTBEAT_KEY, &MemberHeartbeat { tick });

                let mut outbound = Vec::new();
                gossip.send_state(|delta, member, _ctx| outbound.push((delta, member.clone())));

                let exchanges = outbound.into_iter().map(|(delta, member)| {
                    let send = Arc::clone(&send);
                    let ctx = ctx.clone();
                    async move {
                        let target = delta.target_member_id.clone();
                        let exchange = send(delta, member, ctx);
                        if tokio::time::timeout(request_timeout, exchange).await.is_err() {
                            debug!("Exchange with {target} timed out; offsets not committed");
                        }
                    }
                });
                join_all(exchanges).await;
            }
        }));

        Ok(())
    }

    /// Stop the loop and wait for the in-flight round to finish. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.loop_task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!("Gossip loop task failed: {error}");
            }
        }
    }

    /// See [`Gossip::update_cluster_topology`].
    pub fn update_cluster_topology(&self, topology: ClusterTopology) {
        self.gossip.update_cluster_topology(topology);
    }

    /// See [`Gossip::set_state`].
    pub fn set_state<M: Message>(&self, key: &str, message: &M) {
        self.gossip.set_state(key, message);
    }

    /// See [`Gossip::receive_state`].
    pub fn receive_state(&self, remote_state: GossipState) -> Vec<GossipUpdate> {
        self.gossip.receive_state(remote_state)
    }

    /// Decode every member's entry under `key` as `M`.
    ///
    /// Fails on the first entry that does not decode; members without the
    /// key are simply absent from the result.
    pub fn get_state<M: Message + Default>(
        &self,
        key: &str,
    ) -> Result<HashMap<String, M>, GossipError> {
        self.gossip
            .state_for_key(key)
            .into_iter()
            .map(|(member_id, entry)| {
                let message =
                    M::decode(entry.value.as_slice()).map_err(|source| GossipError::PayloadDecode {
                        key: key.to_string(),
                        source,
                    })?;
                Ok((member_id, message))
            })
            .collect()
    }

    /// See [`Gossip::register_consensus_check`].
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
        self.gossip.register_consensus_check(key, extract)
    }

    /// See [`Gossip::register_consensus_check_with`].
    pub fn register_consensus_check_with<T>(
        &self,
        builder: ConsensusCheckBuilder<T>,
    ) -> ConsensusHandle<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.gossip.register_consensus_check_with(builder)
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<GossipUpdate> {
        self.ctx.events().subscribe_updates()
    }

    pub fn subscribe_topology(&self) -> broadcast::Receiver<ClusterTopology> {
        self.ctx.events().subscribe_topology()
    }

    /// See [`Gossip::stats`].
    pub fn stats(&self) -> GossipStats {
        self.gossip.stats()
    }

    /// The publication check agrees on the topology hash, then looks the
    /// matching [`ClusterTopology`] payload up in state and publishes it.
    /// Each hash is published once; losing consensus re-arms publication.
    fn register_topology_publication(&self) {
        // Weak: the check lives inside the engine's own registry, so a
        // strong capture would never let the engine drop.
        let gossip = Arc::downgrade(&self.gossip);
        let events = self.ctx.events().clone();
        let last_published: Mutex<Option<u64>> = Mutex::new(None);

        let check = ConsensusCheckBuilder::<u64>::new(TOPOLOGY_KEY, |topology: &ClusterTopology| {
            topology.topology_hash
        })
        .into_check_with(TOPOLOGY_CONSENSUS_ID, move |outcome| {
            let Some(hash) = outcome else {
                *last_published.lock() = None;
                return;
            };
            {
                let mut last = last_published.lock();
                if *last == Some(hash) {
                    return;
                }
                *last = Some(hash);
            }
            let Some(gossip) = gossip.upgrade() else {
                return;
            };

            // Any member's entry will do; they all agree on the hash.
            for entry in gossip.state_for_key(TOPOLOGY_KEY).into_values() {
                let Ok(topology) = ClusterTopology::decode(entry.value.as_slice()) else {
                    continue;
                };
                if topology.topology_hash == hash {
                    events.publish_topology(topology);
                    break;
                }
            }
        });

        self.gossip.add_consensus_check(check);
    }
}

use async_stream::stream;
use futures::Stream;
use tokio::sync::broadcast;

use crate::{protos::gossip::v1::ClusterTopology, types::GossipUpdate};

/// Typed publish/subscribe channel for engine notifications.
pub trait EventBus<E>: Clone + Send + Sync + 'static
where
    E: Clone + Send + 'static,
{
    /// Type returned to consumers that subscribe to events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, event: E);
}

/// Fire-and-forget bus backed by `tokio::sync::broadcast`.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls more than the buffer behind loses the
/// oldest events rather than stalling the publisher.
#[derive(Clone)]
pub struct BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    sender: broadcast::Sender<E>,
}

impl<E> BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl<E> Default for BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(1000)
    }
}

impl<E> EventBus<E> for BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    type Receiver = broadcast::Receiver<E>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: E) {
        let _ = self.sender.send(event);
    }
}

/// The two notification topics exposed by the engine: one [`GossipUpdate`]
/// per entry changed by a merge, and one [`ClusterTopology`] whenever
/// topology consensus is established with a new hash.
#[derive(Clone, Default)]
pub struct GossipEvents {
    updates: BroadcastEventBus<GossipUpdate>,
    topology: BroadcastEventBus<ClusterTopology>,
}

impl GossipEvents {
    pub fn subscribe_updates(&self) -> broadcast::Receiver<GossipUpdate> {
        self.updates.subscribe()
    }

    pub fn subscribe_topology(&self) -> broadcast::Receiver<ClusterTopology> {
        self.topology.subscribe()
    }

    /// Stream view over the update topic. Gaps from lagging are skipped.
    pub fn update_stream(&self) -> impl Stream<Item = GossipUpdate> + use<> {
        receiver_stream(self.updates.subscribe())
    }

    /// Stream view over the topology topic. Gaps from lagging are skipped.
    pub fn topology_stream(&self) -> impl Stream<Item = ClusterTopology> + use<> {
        receiver_stream(self.topology.subscribe())
    }

    pub(crate) fn publish_update(&self, update: GossipUpdate) {
        self.updates.publish(update);
    }

    pub(crate) fn publish_topology(&self, topology: ClusterTopology) {
        self.topology.publish(topology);
    }
}

fn receiver_stream<E>(mut receiver: broadcast::Receiver<E>) -> impl Stream<Item = E>
where
    E: Clone + Send + 'static,
{
    stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

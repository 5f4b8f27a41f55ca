use std::time::Duration;

use tokio::sync::watch;

/// Latest consensus outcome shared between checker and handle.
#[derive(Debug, Clone, PartialEq)]
struct Observation<T> {
    consensus: bool,
    /// Last value any consensus was reached on. Kept through resets so a
    /// timed-out wait can still report the best currently-held value.
    value: Option<T>,
}

/// Caller side of a registered consensus check.
///
/// Waiters suspend cooperatively until the checker flips the outcome.
/// Dropping the handle unregisters the underlying check, so merges stop
/// re-evaluating predicates nobody is listening to.
pub struct ConsensusHandle<T> {
    receiver: watch::Receiver<Observation<T>>,
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl<T: Clone> ConsensusHandle<T> {
    /// Wait until consensus is reached or `timeout` elapses.
    ///
    /// Returns `(true, value)` on consensus. A timeout is a normal outcome,
    /// not an error, and returns `(false, best)` where `best` is the most
    /// recent value consensus was ever reached on. The same shape is returned
    /// if the engine side has gone away.
    pub async fn try_get_consensus(&mut self, timeout: Duration) -> (bool, Option<T>) {
        let wait = self.receiver.wait_for(|observation| observation.consensus);
        if let Ok(Ok(observation)) = tokio::time::timeout(timeout, wait).await {
            return (true, observation.value.clone());
        }
        self.last_known()
    }

    /// Latest outcome without waiting.
    pub fn last_known(&self) -> (bool, Option<T>) {
        let observation = self.receiver.borrow();
        (observation.consensus, observation.value.clone())
    }
}

impl<T> Drop for ConsensusHandle<T> {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

/// Checker side of the pair: flips the outcome and wakes handle waiters.
/// Owned by the registered check closure; dropping the check drops the
/// signal, which wakes any remaining waiter with the last known outcome.
pub(crate) struct ConsensusSignal<T> {
    sender: watch::Sender<Observation<T>>,
}

impl<T: Clone + PartialEq> ConsensusSignal<T> {
    /// Record consensus on `value`. Waiters are only woken if the outcome
    /// actually changed.
    pub(crate) fn try_set_consensus(&self, value: T) {
        self.sender.send_if_modified(|observation| {
            let next = Observation {
                consensus: true,
                value: Some(value.clone()),
            };
            if *observation == next {
                return false;
            }
            *observation = next;
            true
        });
    }

    /// Record loss of consensus, keeping the last agreed value.
    pub(crate) fn try_reset_consensus(&self) {
        self.sender.send_if_modified(|observation| {
            if !observation.consensus {
                return false;
            }
            observation.consensus = false;
            true
        });
    }
}

/// Create a connected signal/handle pair. `unregister` runs when the handle
/// is dropped.
pub(crate) fn consensus_channel<T>(
    unregister: Box<dyn FnOnce() + Send>,
) -> (ConsensusSignal<T>, ConsensusHandle<T>) {
    let (sender, receiver) = watch::channel(Observation {
        consensus: false,
        value: None,
    });
    (
        ConsensusSignal { sender },
        ConsensusHandle {
            receiver,
            unregister: Some(unregister),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    fn channel<T>() -> (ConsensusSignal<T>, ConsensusHandle<T>) {
        consensus_channel(Box::new(|| {}))
    }

    #[tokio::test]
    async fn set_consensus_wakes_waiter() {
        let (signal, mut handle) = channel::<u64>();

        let waiter = tokio::spawn(async move {
            handle.try_get_consensus(Duration::from_secs(5)).await
        });
        signal.try_set_consensus(42);

        let (consensus, value) = waiter.await.expect("waiter task");
        assert!(consensus);
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn timeout_reports_last_known_value() {
        let (signal, mut handle) = channel::<u64>();

        signal.try_set_consensus(7);
        signal.try_reset_consensus();

        let (consensus, value) = handle.try_get_consensus(Duration::from_millis(10)).await;
        assert!(!consensus);
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn timeout_with_no_history_reports_none() {
        let (_signal, mut handle) = channel::<u64>();

        let (consensus, value) = handle.try_get_consensus(Duration::from_millis(10)).await;
        assert!(!consensus);
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn consensus_already_held_resolves_immediately() {
        let (signal, mut handle) = channel::<u64>();
        signal.try_set_consensus(3);

        // Must not wait for a new notification when the outcome already holds.
        let (consensus, value) = handle.try_get_consensus(Duration::from_secs(5)).await;
        assert!(consensus);
        assert_eq!(value, Some(3));
    }

    #[tokio::test]
    async fn dropped_signal_unblocks_waiter() {
        let (signal, mut handle) = channel::<u64>();
        drop(signal);

        let (consensus, value) = handle.try_get_consensus(Duration::from_secs(5)).await;
        assert!(!consensus);
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn drop_runs_unregister_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let (_signal, handle) = consensus_channel::<u64>(Box::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        }));

        drop(handle);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reconsensus_after_reset_is_observed() {
        let (signal, mut handle) = channel::<u64>();

        signal.try_set_consensus(1);
        signal.try_reset_consensus();
        assert_eq!(handle.last_known(), (false, Some(1)));

        signal.try_set_consensus(2);
        let (consensus, value) = handle.try_get_consensus(Duration::from_secs(5)).await;
        assert!(consensus);
        assert_eq!(value, Some(2));
    }
}

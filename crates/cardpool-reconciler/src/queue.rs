//! A small rate-limited work queue: at most one in-flight worker per key,
//! exponential backoff on requeue, a retry ceiling after which a key is
//! dropped with a logged error. Modeled on the classic
//! watch-informer/work-queue split: producers call `add`, a pool of
//! workers calls `get`/`done`/`requeue`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// A namespaced pod key, the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for PodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

struct State {
    in_flight: HashSet<PodKey>,
    retries: HashMap<PodKey, u32>,
}

pub struct WorkQueue {
    tx: mpsc::Sender<PodKey>,
    rx: tokio::sync::Mutex<mpsc::Receiver<PodKey>>,
    state: Mutex<State>,
    max_retries: u32,
    base_backoff: Duration,
}

impl WorkQueue {
    pub fn new(capacity: usize, max_retries: u32, base_backoff: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            state: Mutex::new(State {
                in_flight: HashSet::new(),
                retries: HashMap::new(),
            }),
            max_retries,
            base_backoff,
        }
    }

    /// Enqueue `key` immediately unless a worker is already processing it —
    /// this is what gives the queue its at-most-one-worker-per-key property.
    pub async fn add(&self, key: PodKey) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.in_flight.insert(key.clone()) {
                return;
            }
        }
        let _ = self.tx.send(key).await;
    }

    /// Pull the next key for a worker to process.
    pub async fn get(&self) -> Option<PodKey> {
        self.rx.lock().await.recv().await
    }

    /// Processing succeeded: forget its retry count and allow it to be
    /// re-enqueued.
    pub fn done(&self, key: &PodKey) {
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(key);
        state.retries.remove(key);
    }

    /// Processing failed: requeue after an exponential backoff, unless the
    /// retry ceiling has been hit, in which case drop the key with a
    /// logged error (matches the work queue's default rate limiter
    /// behavior with a bounded number of retries).
    pub async fn requeue_after_failure(&self, key: PodKey, error: impl std::fmt::Display) {
        // `in_flight` stays set across the backoff window so a concurrent
        // `add()` for the same key doesn't enqueue a second, redundant item.
        let attempt = {
            let mut state = self.state.lock().unwrap();
            let count = state.retries.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt > self.max_retries {
            warn!("giving up on {key} after {attempt} retries: {error}");
            let mut state = self.state.lock().unwrap();
            state.retries.remove(&key);
            state.in_flight.remove(&key);
            return;
        }

        warn!("requeueing {key} (attempt {attempt}) after error: {error}");
        let backoff = self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1));
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = tx.send(key).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PodKey {
        PodKey {
            namespace: "default".to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let q = WorkQueue::new(16, 5, Duration::from_millis(1));
        q.add(key("p1")).await;
        let got = q.get().await.unwrap();
        assert_eq!(got, key("p1"));
        q.done(&got);
    }

    #[tokio::test]
    async fn duplicate_add_while_in_flight_is_deduped() {
        let q = WorkQueue::new(16, 5, Duration::from_millis(1));
        q.add(key("p1")).await;
        q.add(key("p1")).await; // still in flight, should be a no-op
        let got = q.get().await.unwrap();
        assert_eq!(got, key("p1"));

        // no second item queued
        let empty = tokio::time::timeout(Duration::from_millis(20), q.get()).await;
        assert!(empty.is_err());
        q.done(&got);
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_after_failure_retries_with_backoff() {
        let q = WorkQueue::new(16, 5, Duration::from_millis(10));
        q.requeue_after_failure(key("p1"), "boom").await;

        tokio::time::advance(Duration::from_millis(15)).await;
        let got = q.get().await.unwrap();
        assert_eq!(got, key("p1"));
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_max_retries_drops_the_key() {
        let q = WorkQueue::new(16, 1, Duration::from_millis(1));
        q.requeue_after_failure(key("p1"), "boom").await;
        tokio::time::advance(Duration::from_millis(5)).await;
        let _ = q.get().await.unwrap();

        // second failure exceeds max_retries (1) and should be dropped
        q.requeue_after_failure(key("p1"), "boom again").await;
        tokio::time::advance(Duration::from_millis(20)).await;

        let empty = tokio::time::timeout(Duration::from_millis(5), q.get()).await;
        assert!(empty.is_err());
    }
}

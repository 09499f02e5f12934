//! Pending reply slots keyed by correlation id
//!
//! Several requests may share an id; their replies are handed out in the
//! order the requests were registered. An id is present in the map only
//! while at least one waiter is queued for it.

use crate::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<Value>>;

#[derive(Debug, Default)]
pub(crate) struct Correlator {
    slots: Mutex<HashMap<String, VecDeque<Waiter>>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a waiter for the next reply carrying `id`
    pub(crate) fn register(&self, id: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().entry(id.to_string()).or_default().push_back(tx);
        rx
    }

    /// Hand `reply` to the oldest live waiter for `id`.
    ///
    /// Waiters whose receiver is gone are discarded. Gives the reply back
    /// when nobody was waiting for it.
    pub(crate) fn resolve(&self, id: &str, reply: Value) -> std::result::Result<(), Value> {
        let mut slots = self.slots.lock();
        let Some(queue) = slots.get_mut(id) else {
            return Err(reply);
        };

        let mut reply = reply;
        while let Some(waiter) = queue.pop_front() {
            match waiter.send(Ok(reply)) {
                Ok(()) => {
                    if queue.is_empty() {
                        slots.remove(id);
                    }
                    return Ok(());
                }
                // Receiver dropped; the reply comes back unchanged.
                Err(returned) => reply = returned.unwrap_or_default(),
            }
        }

        slots.remove(id);
        Err(reply)
    }

    /// Fail every queued waiter with `Error::Disconnected` and empty the map.
    /// Returns how many live waiters were failed.
    pub(crate) fn fail_all(&self) -> usize {
        let slots = std::mem::take(&mut *self.slots.lock());
        slots
            .into_values()
            .flatten()
            .map(|waiter| waiter.send(Err(Error::Disconnected)).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Number of queued waiters across all ids
    pub(crate) fn pending(&self) -> usize {
        self.slots.lock().values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.slots.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn test_fifo_per_id() {
        let correlator = Correlator::new();
        let first = correlator.register("job-1");
        let second = correlator.register("job-1");
        assert_eq!(correlator.pending(), 2);

        correlator.resolve("job-1", json!({ "code": 1 })).unwrap();
        assert!(correlator.contains("job-1"));
        correlator.resolve("job-1", json!({ "code": 3 })).unwrap();
        assert!(!correlator.contains("job-1"));

        assert_eq!(first.await.unwrap().unwrap()["code"], 1);
        assert_eq!(second.await.unwrap().unwrap()["code"], 3);
    }

    #[test]
    fn test_unmatched_reply_is_returned() {
        let correlator = Correlator::new();
        let reply = json!({ "id": "x" });
        assert_eq!(correlator.resolve("x", reply.clone()), Err(reply));
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let correlator = Correlator::new();
        let abandoned = correlator.register("login");
        let live = correlator.register("login");
        drop(abandoned);

        correlator.resolve("login", json!({ "code": 0 })).unwrap();
        assert_eq!(live.await.unwrap().unwrap()["code"], 0);
        assert_eq!(correlator.pending(), 0);
    }

    #[test]
    fn test_only_dropped_waiters_gives_reply_back() {
        let correlator = Correlator::new();
        drop(correlator.register("a"));
        assert!(correlator.resolve("a", json!(1)).is_err());
        assert!(!correlator.contains("a"));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let correlator = Correlator::new();
        let a = correlator.register("a");
        let b = correlator.register("b");
        drop(correlator.register("c"));

        assert_eq!(correlator.fail_all(), 2);
        assert_eq!(correlator.pending(), 0);
        assert_matches!(a.await.unwrap(), Err(Error::Disconnected));
        assert_matches!(b.await.unwrap(), Err(Error::Disconnected));
    }
}

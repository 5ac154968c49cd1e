//! Collapses concurrent identical reads onto one network request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::activity::ActivityIndicator;
use crate::api::ApiError;

type ReadResult<T> = Result<T, ApiError>;
type ReadChannel<T> = Shared<oneshot::Receiver<ReadResult<T>>>;

/// Runs a closure when dropped.
struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// At most one outstanding read per key.
///
/// The first caller for a key spawns the read; later callers with the same
/// key join it and receive a clone of the same result, success or failure.
/// The key is released the moment the read settles, so the next call after
/// that always goes to the network again.
pub struct RequestDeduplicator<T> {
    in_flight: Arc<Mutex<HashMap<String, ReadChannel<T>>>>,
    activity: ActivityIndicator,
}

impl<T> Clone for RequestDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            in_flight: self.in_flight.clone(),
            activity: self.activity.clone(),
        }
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(activity: ActivityIndicator) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            activity,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    /// Join the read in flight for `key`, or start one with `factory`.
    ///
    /// NOTE: Not `async`: the read is spawned onto the current tokio runtime
    /// right away and runs to completion even if every caller drops the
    /// returned future. Must be called from within a runtime.
    pub fn read_through<F, Fut>(&self, key: &str, factory: F) -> BoxFuture<'static, ReadResult<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReadResult<T>> + Send + 'static,
    {
        let channel = {
            let mut in_flight = self.in_flight.lock();
            if let Some(channel) = in_flight.get(key) {
                trace!(key = %key, "Joining in-flight read");
                channel.clone()
            } else {
                debug!(key = %key, "Starting read");
                let channel = self.spawn_read(key.to_string(), factory());
                in_flight.insert(key.to_string(), channel.clone());
                channel
            }
        };

        channel
            .unwrap_or_else(|_cancelled| Err(ApiError::Abandoned))
            .boxed()
    }

    fn spawn_read<Fut>(&self, key: String, read: Fut) -> ReadChannel<T>
    where
        Fut: Future<Output = ReadResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let busy = self.activity.acquire();

        let in_flight = self.in_flight.clone();
        let remove_token = CallOnDrop::new(move || {
            in_flight.lock().remove(&key);
        });

        tokio::spawn(async move {
            let result = read.await;
            // Evict before delivering, so callers either join a channel that
            // will still receive data or start a fresh read.
            drop(remove_token);
            drop(busy);
            sender.send(result).ok();
        });

        receiver.shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::NoopSurface;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn dedup() -> (RequestDeduplicator<u32>, ActivityIndicator) {
        let activity = ActivityIndicator::new(Duration::from_millis(300), Arc::new(NoopSurface));
        (RequestDeduplicator::new(activity.clone()), activity)
    }

    fn counting_read(
        calls: &Arc<AtomicUsize>,
        result: ReadResult<u32>,
    ) -> impl FnOnce() -> BoxFuture<'static, ReadResult<u32>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(10)).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_request() {
        let (dedup, _) = dedup();
        let calls = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..5)
            .map(|_| dedup.read_through("seasons", counting_read(&calls, Ok(42))))
            .collect();
        assert_eq!(dedup.in_flight(), 1);

        let results = futures::future::join_all(futures).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(42)));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_and_key_cleared() {
        let (dedup, activity) = dedup();
        let calls = Arc::new(AtomicUsize::new(0));
        let error = ApiError::ServerError("boom".to_string());

        let a = dedup.read_through("k", counting_read(&calls, Err(error.clone())));
        let b = dedup.read_through("k", counting_read(&calls, Ok(1)));
        assert_eq!(a.await, Err(error.clone()));
        assert_eq!(b.await, Err(error));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(activity.outstanding(), 0);

        // No retry or memo: the next call reaches the network again
        assert_eq!(dedup.read_through("k", counting_read(&calls, Ok(7))).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        let (dedup, _) = dedup();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = dedup.read_through("a", counting_read(&calls, Ok(1)));
        let b = dedup.read_through("b", counting_read(&calls, Ok(2)));
        assert_eq!(dedup.in_flight(), 2);
        assert_eq!((a.await, b.await), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_completes_after_callers_leave() {
        let (dedup, activity) = dedup();
        let finished = Arc::new(AtomicUsize::new(0));

        let flag = finished.clone();
        let future = dedup.read_through("k", move || async move {
            sleep(Duration::from_millis(50)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        drop(future);
        assert_eq!(activity.outstanding(), 1);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);
        assert_eq!(activity.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_joined_reads_count_once_for_activity() {
        let (dedup, activity) = dedup();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = dedup.read_through("k", counting_read(&calls, Ok(1)));
        let b = dedup.read_through("k", counting_read(&calls, Ok(1)));
        assert_eq!(activity.outstanding(), 1);
        let _ = futures::future::join(a, b).await;
        assert_eq!(activity.outstanding(), 0);
    }
}

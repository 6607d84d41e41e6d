use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;

use super::api_error::{ApiErrorDetails, extract_api_error_details};

type SharedOutcome<T> = Result<T, ApiErrorDetails>;

struct PendingRequest<T> {
    future: Shared<BoxFuture<'static, SharedOutcome<T>>>,
    started: Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupStats {
    pub pending: usize,
}

/// Collapses concurrent identical requests into one shared execution.
///
/// While a call for a key is in flight, further `execute` calls with the same
/// key await the same future instead of invoking the operation again; success
/// and failure both fan out to every waiter. Registrations are dropped when
/// the operation settles, and a defensive sweep removes anything older than
/// `max_age` so a lost removal cannot wedge the key forever.
pub struct RequestDeduplicator<T> {
    pending: Arc<Mutex<HashMap<String, PendingRequest<T>>>>,
    max_age: Duration,
}

impl<T: Clone + Send + Sync + 'static> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl<T: Clone + Send + Sync + 'static> RequestDeduplicator<T> {
    pub fn new(max_age: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            max_age,
        }
    }

    /// Run `request` for `key`, or join the in-flight execution for that key.
    pub async fn execute<F, Fut>(&self, key: &str, request: F) -> Result<T, ApiErrorDetails>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, entry| entry.started.elapsed() <= self.max_age);

            match pending.get(key) {
                Some(entry) => entry.future.clone(),
                None => {
                    let map = Arc::clone(&self.pending);
                    let owned_key = key.to_string();
                    let fut = request();
                    let shared = async move {
                        let outcome = fut.await.map_err(|e| extract_api_error_details(&e));
                        map.lock().await.remove(&owned_key);
                        outcome
                    }
                    .boxed()
                    .shared();
                    pending.insert(
                        key.to_string(),
                        PendingRequest {
                            future: shared.clone(),
                            started: Instant::now(),
                        },
                    );
                    shared
                }
            }
        };

        shared.await
    }

    pub async fn clear(&self) {
        self.pending.lock().await.clear();
    }

    pub async fn stats(&self) -> DedupStats {
        DedupStats {
            pending: self.pending.lock().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slow_success(calls: &Arc<AtomicUsize>, value: u32) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<u32>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                smol::Timer::after(Duration::from_millis(30)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[test]
    fn concurrent_calls_share_one_execution() {
        smol::block_on(async {
            let dedup = RequestDeduplicator::<u32>::default();
            let calls = Arc::new(AtomicUsize::new(0));

            let (a, b) = futures::join!(
                dedup.execute("query:conn:select 1", slow_success(&calls, 7)),
                dedup.execute("query:conn:select 1", slow_success(&calls, 7)),
            );

            assert_eq!(a.unwrap(), 7);
            assert_eq!(b.unwrap(), 7);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn distinct_keys_run_independently() {
        smol::block_on(async {
            let dedup = RequestDeduplicator::<u32>::default();
            let calls = Arc::new(AtomicUsize::new(0));

            let (a, b) = futures::join!(
                dedup.execute("query:conn:select 1", slow_success(&calls, 1)),
                dedup.execute("query:conn:select 2", slow_success(&calls, 2)),
            );

            assert_eq!(a.unwrap(), 1);
            assert_eq!(b.unwrap(), 2);
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn failures_propagate_to_every_waiter() {
        smol::block_on(async {
            let dedup = RequestDeduplicator::<u32>::default();

            let fail = || async move {
                smol::Timer::after(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("connection reset"))
            };

            let (a, b) = futures::join!(
                dedup.execute("query:conn:select 1", fail),
                dedup.execute("query:conn:select 1", fail),
            );

            let a = a.unwrap_err();
            let b = b.unwrap_err();
            assert_eq!(a.message, "connection reset");
            assert_eq!(a, b);
        });
    }

    #[test]
    fn registration_is_removed_after_settling() {
        smol::block_on(async {
            let dedup = RequestDeduplicator::<u32>::default();
            dedup
                .execute("key", || async { Ok(1) })
                .await
                .unwrap();
            assert_eq!(dedup.stats().await.pending, 0);

            // A later call with the same key runs the operation again.
            let out = dedup.execute("key", || async { Ok(2) }).await.unwrap();
            assert_eq!(out, 2);
        });
    }

    #[test]
    fn stale_registrations_are_swept() {
        smol::block_on(async {
            let dedup = RequestDeduplicator::<u32>::new(Duration::from_millis(20));
            {
                // Insert a registration by hand that never settles, simulating
                // a wedged removal.
                let mut pending = dedup.pending.lock().await;
                pending.insert(
                    "stuck".into(),
                    PendingRequest {
                        future: futures::future::pending::<SharedOutcome<u32>>()
                            .boxed()
                            .shared(),
                        started: Instant::now(),
                    },
                );
            }
            smol::Timer::after(Duration::from_millis(40)).await;
            let out = dedup.execute("stuck", || async { Ok(3) }).await.unwrap();
            assert_eq!(out, 3);
        });
    }
}

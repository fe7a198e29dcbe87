//! C3 Hybrid Storage: durable-first persistence with an
//! in-memory fallback when the durable backend is unreachable, reconciled
//! by a background ticker once connectivity is restored.
//!
//! Grounded on `shadowai_core::jobs::queue::RedisJobQueue`'s retry/backing
//! idioms and `shadowai_core::database::DatabasePool`'s cached-map pattern.

use async_trait::async_trait;
use dashmap::DashMap;
use shadowai_core::error::{Error, ErrorCode, Result};
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Extracts the dedup key Hybrid Storage uses to merge durable and
/// pending-memory views of the same logical entity` for connections).
pub trait NaturalKey {
    type Key: Eq + Hash + Clone + Send + Sync;
    fn natural_key(&self) -> Self::Key;
}

/// The durable backend a `HybridRepository<T>` writes through to. Callers
/// supply a concrete Postgres-backed implementation per entity type.
#[async_trait]
pub trait DurableWriter<T>: Send + Sync {
    async fn write(&self, item: &T) -> Result<T>;
    async fn read_all(&self) -> Result<Vec<T>>;
    /// Cheap connectivity probe used by the reconciler tick.
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
struct PendingItem<T> {
    item: T,
    attempts: u32,
    last_error: Option<String>,
}

/// Whether a write went straight to the durable store or fell back to
/// the in-memory pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub used_fallback: bool,
}

const MAX_PENDING: usize = 10_000;

/// Durable-first, memory-fallback wrapper around one entity's durable
/// repository. One instance is constructed per entity type that needs the
/// hybrid contract (connections today; generic over `T` so other entities
/// can reuse it).
pub struct HybridRepository<T, D>
where
    T: Clone + NaturalKey + Send + Sync + 'static,
    D: DurableWriter<T>,
{
    durable: Arc<D>,
    cache: DashMap<T::Key, T>,
    pending: Mutex<VecDeque<PendingItem<T>>>,
    reconcile_lock: Mutex<()>,
}

impl<T, D> HybridRepository<T, D>
where
    T: Clone + NaturalKey + Send + Sync + 'static,
    D: DurableWriter<T>,
{
    pub fn new(durable: Arc<D>) -> Self {
        Self {
            durable,
            cache: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Attempts a durable write; falls back to the bounded in-memory queue
    /// on a transient/connectivity-class error rather than failing the
    /// caller.
    pub async fn write(&self, item: T) -> Result<WriteOutcome> {
        match self.durable.write(&item).await {
            Ok(canonical) => {
                self.cache.insert(canonical.natural_key(), canonical);
                Ok(WriteOutcome { used_fallback: false })
            }
            Err(error) if is_transient(&error) => {
                warn!(%error, "durable write failed, queuing for reconciliation");
                let mut pending = self.pending.lock().await;
                if pending.len() >= MAX_PENDING {
                    return Err(Error::new(
                        ErrorCode::ResourceExhausted,
                        "hybrid storage pending queue is full",
                    ));
                }
                pending.push_back(PendingItem {
                    item: item.clone(),
                    attempts: 0,
                    last_error: Some(error.message.clone()),
                });
                self.cache.insert(item.natural_key(), item);
                Ok(WriteOutcome { used_fallback: true })
            }
            Err(error) => Err(error),
        }
    }

    /// Merges durable rows with still-pending memory rows, deduplicating
    /// by natural key and preferring the durable copy.
    pub async fn read_all(&self) -> Result<Vec<T>> {
        let durable_rows = self.durable.read_all().await.unwrap_or_default();
        let mut by_key: std::collections::HashMap<T::Key, T> = std::collections::HashMap::new();
        for row in durable_rows {
            by_key.insert(row.natural_key(), row);
        }

        let pending = self.pending.lock().await;
        for pending_item in pending.iter() {
            by_key
                .entry(pending_item.item.natural_key())
                .or_insert_with(|| pending_item.item.clone());
        }

        Ok(by_key.into_values().collect())
    }

    pub fn pending_len(&self) -> usize {
        // best-effort, not hot path
        futures_count(&self.pending)
    }

    /// Probes durable connectivity; on success drains the pending queue
    /// in insertion order, deduplicating by natural key. Idempotent and
    /// guarded by a lock so overlapping ticks don't double-drain
    ///.
    pub async fn reconcile(&self) -> Result<usize> {
        let _guard = self.reconcile_lock.try_lock();
        let _guard = match _guard {
            Ok(guard) => guard,
            Err(_) => return Ok(0),
        };

        if self.durable.ping().await.is_err() {
            return Ok(0);
        }

        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut seen = std::collections::HashSet::new();
        let mut drained = 0;
        let mut still_pending = VecDeque::new();

        while let Some(mut item) = pending.pop_front() {
            let key = item.item.natural_key();
            if !seen.insert(key) {
                continue; // duplicate natural key already drained this tick
            }
            match self.durable.write(&item.item).await {
                Ok(canonical) => {
                    self.cache.insert(canonical.natural_key(), canonical);
                    drained += 1;
                }
                Err(error) => {
                    item.attempts += 1;
                    item.last_error = Some(error.message.clone());
                    still_pending.push_back(item);
                }
            }
        }

        *pending = still_pending;
        info!(drained, "hybrid storage reconciler drained pending writes");
        Ok(drained)
    }
}

fn is_transient(error: &Error) -> bool {
    matches!(
        error.category(),
        shadowai_core::error::ErrorCategory::Storage | shadowai_core::error::ErrorCategory::Network
    )
}

fn futures_count<T>(mutex: &Mutex<VecDeque<T>>) -> usize {
    mutex.try_lock().map(|g| g.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Conn {
        platform: String,
        platform_user_id: String,
        display_name: String,
    }

    impl NaturalKey for Conn {
        type Key = (String, String);
        fn natural_key(&self) -> Self::Key {
            (self.platform.clone(), self.platform_user_id.clone())
        }
    }

    struct FlakyDurable {
        up: AtomicBool,
        rows: Mutex<Vec<Conn>>,
    }

    #[async_trait]
    impl DurableWriter<Conn> for FlakyDurable {
        async fn write(&self, item: &Conn) -> Result<Conn> {
            if !self.up.load(Ordering::SeqCst) {
                return Err(Error::transient("database outage"));
            }
            let mut rows = self.rows.lock().await;
            rows.retain(|r| r.natural_key() != item.natural_key());
            rows.push(item.clone());
            Ok(item.clone())
        }

        async fn read_all(&self) -> Result<Vec<Conn>> {
            Ok(self.rows.lock().await.clone())
        }

        async fn ping(&self) -> Result<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::transient("database outage"))
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_memory_then_reconciles_on_restore() {
        let durable = Arc::new(FlakyDurable {
            up: AtomicBool::new(false),
            rows: Mutex::new(Vec::new()),
        });
        let repo = HybridRepository::new(durable.clone());

        let outcome = repo
            .write(Conn {
                platform: "slack".to_string(),
                platform_user_id: "u1".to_string(),
                display_name: "first".to_string(),
            })
            .await
            .unwrap();
        assert!(outcome.used_fallback);

        let rows = repo.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);

        durable.up.store(true, Ordering::SeqCst);
        let drained = repo.reconcile().await.unwrap();
        assert_eq!(drained, 1);

        let rows = repo.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name, "first");
    }

    #[tokio::test]
    async fn direct_write_is_not_fallback_when_durable_is_up() {
        let durable = Arc::new(FlakyDurable {
            up: AtomicBool::new(true),
            rows: Mutex::new(Vec::new()),
        });
        let repo = HybridRepository::new(durable);

        let outcome = repo
            .write(Conn {
                platform: "google".to_string(),
                platform_user_id: "u2".to_string(),
                display_name: "second".to_string(),
            })
            .await
            .unwrap();
        assert!(!outcome.used_fallback);
    }
}

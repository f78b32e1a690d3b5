//! In-process credential store
//!
//! A string-keyed concurrent map used for the subsystem's bookkeeping:
//! refresh-token records, rate-limit buckets, IP reputation records, and
//! two-factor state. Each component constructs and owns its own store —
//! nothing here is global, so tests control the full lifetime.
//!
//! Entries may carry a TTL and are tracked for idleness. Expired and idle
//! entries are physically removed by `sweep`, which each owning component
//! drives from a periodic task. Sweeping is a liveness optimization that
//! bounds memory; correctness-relevant expiry (refresh-token lifetime,
//! pending-setup lifetime) is enforced by the owning component against the
//! timestamps inside its own records.
//!
//! Mutations through `with_entry`/`with_entry_or_insert` run under the
//! entry's shard lock, which makes check-then-act sequences (bucket
//! refill+debit, recovery-code consumption) atomic per key. `remove` is an
//! atomic take: exactly one caller observes the value.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct Entry<V> {
    value: V,
    expires_at_ms: Option<i64>,
    touched_at_ms: i64,
}

struct Inner<V> {
    entries: DashMap<String, Entry<V>>,
    idle_timeout_ms: Option<i64>,
}

pub struct CredentialStore<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for CredentialStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for CredentialStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CredentialStore<V> {
    /// Store without idle collection; entries live until removed or their
    /// TTL is swept.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                idle_timeout_ms: None,
            }),
        }
    }

    /// Store whose entries are additionally swept after `idle_timeout`
    /// without a mutating touch. Used for lazily-created per-key state
    /// (rate buckets, IP records).
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                idle_timeout_ms: Some(idle_timeout.as_millis() as i64),
            }),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let now = now_ms();
        self.inner.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at_ms: ttl.map(|d| now + d.as_millis() as i64),
                touched_at_ms: now,
            },
        );
    }

    /// Run `f` against the entry under its shard lock.
    ///
    /// Returns `None` when the key is absent. The closure must not call
    /// back into the same store (shard locks do not nest).
    pub fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut entry = self.inner.entries.get_mut(key)?;
        entry.touched_at_ms = now_ms();
        Some(f(&mut entry.value))
    }

    /// Like `with_entry`, but creates the entry from `init` when absent.
    /// The create-or-mutate sequence is atomic for the key.
    pub fn with_entry_or_insert<R>(
        &self,
        key: &str,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut entry = self
            .inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: init(),
                expires_at_ms: None,
                touched_at_ms: now_ms(),
            });
        entry.touched_at_ms = now_ms();
        f(&mut entry.value)
    }

    /// Atomic take: at most one caller gets the value.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every entry for which `f` returns false.
    pub fn retain(&self, mut f: impl FnMut(&str, &V) -> bool) {
        self.inner.entries.retain(|key, entry| f(key, &entry.value));
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Remove entries past their TTL or idle beyond the store's idle
    /// timeout. Holds only one shard lock at a time.
    pub fn sweep(&self) -> usize {
        let now = now_ms();
        let idle = self.inner.idle_timeout_ms;
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| {
            if let Some(expires_at) = entry.expires_at_ms {
                if expires_at <= now {
                    return false;
                }
            }
            if let Some(idle_ms) = idle {
                if now - entry.touched_at_ms > idle_ms {
                    return false;
                }
            }
            true
        });
        before.saturating_sub(self.inner.entries.len())
    }

    /// Spawn a periodic sweep task. The caller owns the handle and aborts
    /// it on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()>
    where
        V: Send + Sync + 'static,
    {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    tracing::debug!("credential store sweep removed {} entries", removed);
                }
            }
        })
    }
}

impl<V: Clone> CredentialStore<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Clone out all live entries; used for monitoring endpoints.
    pub fn snapshot(&self) -> Vec<(String, V)> {
        self.inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }
}

//! Dedup/cache registry for backend lookups.
//!
//! Keyed tracking of in-flight and recently completed fetches:
//!
//! - **In flight**: concurrent callers for the same key attach to the one
//!   running fetch and all receive its outcome.
//! - **Ready**: a successful outcome is served for `ttl` without any call.
//! - Failures are never stored; the next caller fetches again.
//!
//! ```text
//! get_or_fetch(key)
//!   ├─ Ready, fresh   → value (no call)
//!   ├─ InFlight       → await the shared fetch
//!   └─ absent / stale → producer() once, publish as InFlight
//!                        └─ on completion: Ok → Ready(ttl), Err → removed
//! ```
//!
//! Invalidating a key whose fetch is still running marks the slot as
//! discarded instead of removing it: later callers keep joining that fetch,
//! so a second producer never starts, and its outcome is dropped on
//! completion. Expired entries are purged at most once per TTL as lookups
//! arrive, and [`spawn_purge_task`] can sweep them in the background.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Slot<V, E>
where
    V: Clone,
    E: Clone,
{
    InFlight {
        ticket: u64,
        fetch: SharedFetch<V, E>,
        /// Invalidated while running; the outcome is not stored
        discard: bool,
    },
    Ready { value: V, expires_at: Instant },
}

enum Current<V, E>
where
    V: Clone,
    E: Clone,
{
    Fresh(V),
    InFlight(u64, SharedFetch<V, E>),
    Stale,
}

/// Statistics for one registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Entries currently held (in flight or ready)
    pub entries: usize,
    /// Served from a fresh ready entry
    pub hits: u64,
    /// No entry existed
    pub misses: u64,
    /// Attached to a fetch already in flight
    pub joins: u64,
    /// Producer invocations
    pub fetches: u64,
    /// Ready entries found past their TTL
    pub expirations: u64,
}

impl RegistryStats {
    /// Share of lookups answered without starting a fetch, as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.joins + self.misses + self.expirations;
        if total == 0 {
            0.0
        } else {
            ((self.hits + self.joins) as f64 / total as f64) * 100.0
        }
    }
}

/// Keyed in-flight dedup plus short-TTL result cache.
///
/// At most one producer runs per key at any instant, however many callers
/// ask for that key.
pub struct DedupRegistry<K, V, E>
where
    V: Clone,
    E: Clone,
{
    name: &'static str,
    ttl: Duration,
    entries: DashMap<K, Slot<V, E>>,
    next_ticket: AtomicU64,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last purge
    last_purge_ms: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    fetches: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V, E> DedupRegistry<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a registry whose successful results live for `ttl`.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        debug!(registry = name, ttl_ms = ttl.as_millis() as u64, "Registry created");

        Self {
            name,
            ttl,
            entries: DashMap::new(),
            next_ticket: AtomicU64::new(0),
            created_at: Instant::now(),
            last_purge_ms: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, join the in-flight fetch, or run `producer`.
    ///
    /// `producer` is called at most once, and only when this caller becomes
    /// the one responsible for the fetch.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.purge_if_due();

        let (ticket, fetch) = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = match occupied.get() {
                    Slot::Ready { value, expires_at } if Instant::now() < *expires_at => {
                        Current::Fresh(value.clone())
                    }
                    Slot::InFlight { ticket, fetch, .. } => {
                        Current::InFlight(*ticket, fetch.clone())
                    }
                    Slot::Ready { .. } => Current::Stale,
                };

                match current {
                    Current::Fresh(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(registry = self.name, key = ?key, "Registry hit");
                        return Ok(value);
                    }
                    Current::InFlight(ticket, fetch) => {
                        self.joins.fetch_add(1, Ordering::Relaxed);
                        debug!(registry = self.name, key = ?key, "Joining in-flight fetch");
                        (ticket, fetch)
                    }
                    Current::Stale => {
                        self.expirations.fetch_add(1, Ordering::Relaxed);
                        debug!(registry = self.name, key = ?key, "Registry entry expired");
                        let (ticket, fetch) = self.launch(producer);
                        occupied.insert(Slot::InFlight {
                            ticket,
                            fetch: fetch.clone(),
                            discard: false,
                        });
                        (ticket, fetch)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(registry = self.name, key = ?key, "Registry miss");
                let (ticket, fetch) = self.launch(producer);
                vacant.insert(Slot::InFlight {
                    ticket,
                    fetch: fetch.clone(),
                    discard: false,
                });
                (ticket, fetch)
            }
        };

        let outcome = fetch.await;
        self.settle(&key, ticket, &outcome);
        outcome
    }

    /// Peek at a fresh cached value without fetching.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.entries.get(key)?.value() {
            Slot::Ready { value, expires_at } if Instant::now() < *expires_at => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Whether a fetch for `key` is currently running.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|slot| matches!(slot.value(), Slot::InFlight { .. }))
            .unwrap_or(false)
    }

    /// Drop whatever is held for `key`.
    ///
    /// A running fetch keeps its slot so callers still join it instead of
    /// starting another, but its outcome is not stored.
    pub fn invalidate(&self, key: &K) -> bool {
        let Entry::Occupied(mut occupied) = self.entries.entry(key.clone()) else {
            return false;
        };

        match occupied.get_mut() {
            Slot::InFlight { discard, .. } => *discard = true,
            Slot::Ready { .. } => {
                occupied.remove();
            }
        }

        debug!(registry = self.name, key = ?key, "Registry entry invalidated");
        true
    }

    /// Drop every ready entry and discard the outcome of every running fetch.
    pub fn clear(&self) {
        self.entries.retain(|_, slot| match slot {
            Slot::InFlight { discard, .. } => {
                *discard = true;
                true
            }
            Slot::Ready { .. } => false,
        });
        debug!(registry = self.name, "Registry cleared");
    }

    /// Remove ready entries past their TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => now < *expires_at,
            Slot::InFlight { .. } => true,
        });
        let removed = before.saturating_sub(self.entries.len());
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn launch<F, Fut>(&self, producer: F) -> (u64, SharedFetch<V, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        (ticket, producer().boxed().shared())
    }

    /// Record the outcome of fetch `ticket`, if its slot is still current.
    fn settle(&self, key: &K, ticket: u64, outcome: &Result<V, E>) {
        let Entry::Occupied(mut occupied) = self.entries.entry(key.clone()) else {
            return;
        };

        let discard = match occupied.get() {
            Slot::InFlight {
                ticket: current,
                discard,
                ..
            } if *current == ticket => *discard,
            _ => return,
        };

        match outcome {
            Ok(value) if !discard => {
                occupied.insert(Slot::Ready {
                    value: value.clone(),
                    expires_at: Instant::now() + self.ttl,
                });
            }
            Ok(_) => {
                occupied.remove();
                debug!(registry = self.name, key = ?key, "Discarded fetch completed, slot released");
            }
            Err(_) => {
                occupied.remove();
                debug!(registry = self.name, key = ?key, "Fetch failed, slot released");
            }
        }
    }

    /// Purge expired entries if a TTL has passed since the last purge.
    fn purge_if_due(&self) {
        let now_ms = self.created_at.elapsed().as_millis() as u64;
        let last = self.last_purge_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.ttl.as_millis() as u64 {
            return;
        }

        if self
            .last_purge_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.purge_expired();
            if removed > 0 {
                debug!(registry = self.name, removed, "Purged expired entries");
            }
        }
    }
}

/// Spawn a background task that purges expired entries every `interval`.
///
/// The task holds only a weak reference and stops once the registry is dropped.
pub fn spawn_purge_task<K, V, E>(
    registry: &Arc<DedupRegistry<K, V, E>>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let registry: Weak<DedupRegistry<K, V, E>> = Arc::downgrade(registry);

    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let removed = registry.purge_expired();
            let stats = registry.stats();
            debug!(
                registry = registry.name,
                removed,
                entries = stats.entries,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Registry purge completed"
            );
        }
    });

    info!(interval_ms = interval.as_millis() as u64, "Registry purge task started");
    handle
}

use std::{hash::Hash, sync::Arc};

use bytes::Bytes;
use dotfwd_dns::RecordType;
use lru_cache::LruCache;
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{Duration, Instant},
};

pub const DEFAULT_MIN_ENTRIES: usize = 1_000;
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Record types whose answers are worth caching.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
enum CacheableType {
    A,
    NS,
    CNAME,
    MX,
    TXT,
    AAAA,
    ANY,
}

impl CacheableType {
    fn from_record_type(record_type: RecordType) -> Option<Self> {
        match record_type {
            RecordType::A => Some(Self::A),
            RecordType::NS => Some(Self::NS),
            RecordType::CNAME => Some(Self::CNAME),
            RecordType::MX => Some(Self::MX),
            RecordType::TXT => Some(Self::TXT),
            RecordType::AAAA => Some(Self::AAAA),
            RecordType::ANY => Some(Self::ANY),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    kind: CacheableType,
    name: Arc<str>,
}

impl CacheKey {
    /// Construct a `CacheKey`, or `None` if the record type is not cacheable.
    ///
    /// Names are compared case-insensitively and without the trailing dot.
    pub fn new(record_type: impl Into<RecordType>, name: &str) -> Option<Self> {
        let kind = CacheableType::from_record_type(record_type.into())?;

        let trimmed = name.trim().trim_end_matches('.');
        let name = if trimmed.is_empty() {
            ".".to_string()
        } else {
            trimmed.to_ascii_lowercase()
        };

        Some(Self {
            kind,
            name: Arc::from(name),
        })
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    payload: Bytes,
    stored_at: Instant,
    expires_at: Instant,
}

struct CacheState {
    /// Entries ordered from least to most recently used.
    entries: LruCache<CacheKey, CacheEntry>,
    /// Rough number of live entries. Overwrites count twice, so this only
    /// decides when to clean, never whether an entry is served.
    counter: usize,
}

/// Result of a cleaning pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CleanStats {
    /// Entries dropped because their TTL ran out.
    pub expired: usize,
    /// Live entries dropped from the least recently used end.
    pub evicted: usize,
}

/// Bounded, TTL-aware cache of raw DNS response payloads keyed by
/// (record type, name).
pub struct ResponseCache {
    state: Mutex<CacheState>,
    min_size: usize,
    max_size: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ENTRIES, DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    /// Create a cache that cleans once roughly `max_size` entries were
    /// inserted, trimming down to `min_size`.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(usize::MAX),
                counter: 0,
            }),
            min_size: min_size.min(max_size),
            max_size,
        }
    }

    /// Store `payload` for `ttl` seconds.
    ///
    /// Zero TTLs and uncacheable record types are ignored.
    pub fn put(&self, record_type: impl Into<RecordType>, name: &str, ttl: u32, payload: Bytes) {
        if ttl == 0 {
            return;
        }

        let key = match CacheKey::new(record_type, name) {
            Some(key) => key,
            None => return,
        };

        let stored_at = Instant::now();
        let expires_at = stored_at + Duration::from_secs(u64::from(ttl));

        let mut state = self.state.lock();
        if state.counter >= self.max_size {
            self.clean_locked(&mut state);
        }

        tracing::trace!(name = %key.name, ttl, "caching response");
        state.entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at,
                expires_at,
            },
        );
        state.counter += 1;
    }

    /// Look up a live payload, refreshing its recency.
    ///
    /// An expired entry is removed on the spot.
    pub fn get(&self, record_type: impl Into<RecordType>, name: &str) -> Option<Bytes> {
        self.get_with_age(record_type, name).map(|(payload, _)| payload)
    }

    /// Like [`ResponseCache::get`], also returning how long ago the payload
    /// was stored.
    pub fn get_with_age(&self, record_type: impl Into<RecordType>, name: &str) -> Option<(Bytes, Duration)> {
        let key = CacheKey::new(record_type, name)?;
        let now = Instant::now();

        let mut state = self.state.lock();
        let entry = state.entries.get_mut(&key)?;
        if entry.expires_at > now {
            return Some((entry.payload.clone(), now.duration_since(entry.stored_at)));
        }

        state.entries.remove(&key);
        state.counter = state.counter.saturating_sub(1);
        None
    }

    /// Drop expired entries, then evict least recently used ones until at
    /// most `min_size` remain.
    pub fn clean(&self) -> CleanStats {
        let mut state = self.state.lock();
        self.clean_locked(&mut state)
    }

    /// Drop expired entries only.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let expired = purge_expired_locked(&mut state, Instant::now());
        state.counter = state.counter.saturating_sub(expired);
        expired
    }

    fn clean_locked(&self, state: &mut CacheState) -> CleanStats {
        let expired = purge_expired_locked(state, Instant::now());

        let mut evicted = 0;
        while state.entries.len() > self.min_size {
            if state.entries.remove_lru().is_none() {
                break;
            }
            evicted += 1;
        }

        state.counter = self.min_size;

        tracing::debug!(
            expired,
            evicted,
            remaining = state.entries.len(),
            "cache cleaned"
        );

        CleanStats { expired, evicted }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rough entry counter used to trigger cleaning.
    pub fn approximate_size(&self) -> usize {
        self.state.lock().counter
    }

    /// Start a background task that purges expired entries every `interval`.
    pub fn start_reaper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let dropped = self.purge_expired();
                if dropped > 0 {
                    tracing::info!("cache reaper dropped {} expired entries", dropped);
                }
            }
        })
    }
}

fn purge_expired_locked(state: &mut CacheState, now: Instant) -> usize {
    let expired: Vec<CacheKey> = state
        .entries
        .iter()
        .filter(|(_, entry)| entry.expires_at <= now)
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        state.entries.remove(key);
    }
    expired.len()
}

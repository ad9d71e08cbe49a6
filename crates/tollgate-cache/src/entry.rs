use bytes::Bytes;
use http::HeaderMap;
use std::time::{Duration, Instant};

/// A cached origin response for one path.
///
/// Entries are never mutated after construction. A refresh builds a new
/// entry and the store swaps the `Arc` for that key.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub path: String,
    pub body: Bytes,
    pub headers: HeaderMap,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn new(path: impl Into<String>, body: Bytes, headers: HeaderMap, fetched_at: Instant) -> Self {
        Self {
            path: path.into(),
            body,
            headers,
            fetched_at,
        }
    }

    /// Age of the entry relative to `now`. Saturates at zero if `now` is
    /// earlier than the fetch.
    #[inline]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// `true` iff `now - fetched_at < ttl`.
    #[inline]
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Free-function form of [`CacheEntry::is_fresh`].
#[inline]
pub fn is_fresh(entry: &CacheEntry, now: Instant, ttl: Duration) -> bool {
    entry.is_fresh(now, ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(fetched_at: Instant) -> CacheEntry {
        CacheEntry::new("/a.txt", Bytes::from_static(b"hello"), HeaderMap::new(), fetched_at)
    }

    #[test]
    fn fresh_strictly_inside_ttl() {
        let t0 = Instant::now();
        let entry = entry_at(t0);
        let ttl = Duration::from_millis(1000);

        assert!(is_fresh(&entry, t0, ttl));
        assert!(is_fresh(&entry, t0 + Duration::from_millis(500), ttl));
        assert!(is_fresh(&entry, t0 + Duration::from_millis(999), ttl));
    }

    #[test]
    fn stale_at_and_after_ttl() {
        let t0 = Instant::now();
        let entry = entry_at(t0);
        let ttl = Duration::from_millis(1000);

        // Boundary is exclusive.
        assert!(!is_fresh(&entry, t0 + ttl, ttl));
        assert!(!is_fresh(&entry, t0 + Duration::from_millis(1500), ttl));
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let t0 = Instant::now();
        assert!(!entry_at(t0).is_fresh(t0, Duration::ZERO));
    }

    #[test]
    fn age_saturates_before_fetch() {
        let t0 = Instant::now();
        let entry = entry_at(t0 + Duration::from_secs(5));
        assert_eq!(entry.age(t0), Duration::ZERO);
    }
}

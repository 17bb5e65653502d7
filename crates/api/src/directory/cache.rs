//! In-memory organization cache with TTL
//!
//! Caches slug-to-organization lookups, including misses, so repeated requests
//! for the same subdomain do not each hit the database.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use tipjar_shared::Organization;

/// Default cache TTL (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Entry count at which `set` sweeps expired entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Clone)]
struct CacheEntry {
    organization: Option<Organization>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe slug -> organization cache
pub struct OrgCache {
    /// `None` entries record slugs known not to map to an organization
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for OrgCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }
}

impl OrgCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// `Some(Some(org))` on a hit, `Some(None)` on a cached miss, `None` when
    /// the slug is unknown or stale.
    pub fn get(&self, slug: &str) -> Option<Option<Organization>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(slug)?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.organization.clone())
        }
    }

    /// Cache a lookup result.
    ///
    /// Subdomains are client-chosen, so a full cache first drops expired
    /// entries, then cached misses. Misses are not cached while the cache is
    /// still full after that.
    pub fn set(&self, slug: &str, organization: Option<Organization>) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if entries.len() >= self.max_entries && !entries.contains_key(slug) {
            entries.retain(|_, entry| !entry.is_expired());

            if entries.len() >= self.max_entries {
                if organization.is_none() {
                    tracing::debug!(slug = %slug, "Organization cache full, not caching miss");
                    return;
                }
                entries.retain(|_, entry| entry.organization.is_some());
            }
        }

        entries.insert(
            slug.to_string(),
            CacheEntry {
                organization,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, slug: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(slug);
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically sweeps expired entries from an [`OrgCache`]
pub struct CacheCleanupJob {
    cache: Arc<OrgCache>,
    interval: Duration,
}

impl CacheCleanupJob {
    pub fn new(cache: Arc<OrgCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                let removed = self.cache.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, remaining = self.cache.len(), "Swept organization cache");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn org(slug: &str) -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: "Acme Coffee".into(),
            slug: slug.into(),
            logo_url: None,
            primary_color: "#000000".into(),
            secondary_color: "#ffffff".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = OrgCache::default();
        assert!(cache.get("acme").is_none());

        let acme = org("acme");
        cache.set("acme", Some(acme.clone()));
        assert_eq!(cache.get("acme").unwrap().unwrap().id, acme.id);

        // Negative results are cached too
        cache.set("ghost", None);
        assert!(matches!(cache.get("ghost"), Some(None)));
    }

    #[test]
    fn test_expiration_and_cleanup() {
        let cache = OrgCache::with_ttl(Duration::from_millis(50));
        cache.set("acme", Some(org("acme")));
        assert!(cache.get("acme").is_some());

        sleep(Duration::from_millis(60));
        assert!(cache.get("acme").is_none());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.cleanup(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_sweeps_expired_entries_on_insert() {
        let cache = OrgCache::with_limits(Duration::from_millis(20), 3);
        for slug in ["a", "b", "c"] {
            cache.set(slug, None);
        }
        assert_eq!(cache.len(), 3);

        sleep(Duration::from_millis(30));
        cache.set("d", None);

        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.get("d"), Some(None)));
    }

    #[test]
    fn test_misses_cannot_crowd_out_organizations() {
        let cache = OrgCache::with_limits(DEFAULT_CACHE_TTL, 3);
        cache.set("acme", Some(org("acme")));
        cache.set("ghost-1", None);
        cache.set("ghost-2", None);

        // Full of live entries: another miss is not cached
        cache.set("ghost-3", None);
        assert!(cache.get("ghost-3").is_none());
        assert_eq!(cache.len(), 3);

        // A real organization evicts the cached misses instead
        cache.set("beans", Some(org("beans")));
        assert!(cache.get("ghost-1").is_none());
        assert!(cache.get("acme").unwrap().is_some());
        assert!(cache.get("beans").unwrap().is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = OrgCache::default();
        cache.set("acme", None);
        cache.invalidate("acme");
        assert!(cache.get("acme").is_none());
    }

    #[tokio::test]
    async fn test_cleanup_job_sweeps_without_explicit_call() {
        let cache = Arc::new(OrgCache::with_ttl(Duration::from_millis(10)));
        cache.set("ghost", None);
        cache.set("phantom", None);

        let job = CacheCleanupJob::new(cache.clone(), Duration::from_millis(20)).start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        job.abort();

        assert!(cache.is_empty());
    }
}

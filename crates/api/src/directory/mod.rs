//! Tenant directory: subdomain slug -> organization
//!
//! Handlers resolve the tenant named by the request context through
//! [`TenantDirectory`]. The resolver middleware itself never consults it.

mod cache;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tipjar_shared::Organization;

pub use cache::{CacheCleanupJob, OrgCache, DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Organization lookup by subdomain slug
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup_organization(&self, slug: &str) -> Result<Option<Organization>, DirectoryError>;

    /// Forget anything cached for `slug` (after the organization changes)
    fn invalidate(&self, slug: &str);
}

/// Postgres-backed directory with an in-memory TTL cache
pub struct PgTenantDirectory {
    pool: PgPool,
    cache: Arc<OrgCache>,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self::with_cache(pool, Arc::new(OrgCache::default()))
    }

    pub fn with_cache(pool: PgPool, cache: Arc<OrgCache>) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &OrgCache {
        &self.cache
    }

    /// Shared handle for the periodic cleanup task
    pub fn cache_handle(&self) -> Arc<OrgCache> {
        self.cache.clone()
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn lookup_organization(&self, slug: &str) -> Result<Option<Organization>, DirectoryError> {
        let slug = slug.to_ascii_lowercase();

        if let Some(cached) = self.cache.get(&slug) {
            tracing::debug!(slug = %slug, hit = cached.is_some(), "Organization cache hit");
            return Ok(cached);
        }

        let organization: Option<Organization> = sqlx::query_as(
            r#"
            SELECT id, name, slug, logo_url, primary_color, secondary_color, created_at, updated_at
            FROM organizations
            WHERE slug = $1
            "#,
        )
        .bind(&slug)
        .fetch_optional(&self.pool)
        .await?;

        if organization.is_none() {
            tracing::debug!(slug = %slug, "No organization for subdomain");
        }

        self.cache.set(&slug, organization.clone());
        Ok(organization)
    }

    fn invalidate(&self, slug: &str) {
        self.cache.invalidate(&slug.to_ascii_lowercase());
    }
}

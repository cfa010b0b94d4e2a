//! Time-bounded cache of authority service descriptions.
//!
//! A cache entry holds the authority WSDL together with the endpoint it was
//! fetched from. Discovery and fetch form one refresh unit: an expired entry is
//! rediscovered through DNS before the document is fetched again.

mod store;

pub use store::{CacheStore, Clock, FileStore, MemoryStore, SystemClock};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::authority::AuthorityResolver;
use crate::error::{ResolutionError, StoreError};
use crate::transport::{HttpFetch, HttpRequest};
use crate::types::{AuthorityEndpoint, CacheEntry, ServiceDescription, StalePolicy};
use crate::wsdl::parse_authority_wsdl;

/// Cache of authority descriptions with injected storage and clock
#[derive(Clone)]
pub struct DescriptionCache {
    resolver: AuthorityResolver,
    http: Arc<dyn HttpFetch>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    timeout: StdDuration,
    stale_policy: StalePolicy,
}

impl DescriptionCache {
    pub fn new(
        resolver: AuthorityResolver,
        http: Arc<dyn HttpFetch>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        timeout: StdDuration,
    ) -> Self {
        Self {
            resolver,
            http,
            store,
            clock,
            ttl,
            timeout,
            stale_policy: StalePolicy::default(),
        }
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the authority's description, refreshing it when missing or expired
    pub async fn get(&self, authority: &str) -> Result<ServiceDescription, ResolutionError> {
        let key = authority.to_ascii_lowercase();
        let now = self.clock.now();

        let existing = self.load(&key).await?;
        if let Some(entry) = &existing {
            if entry.is_fresh(now, self.ttl) {
                match self.describe(entry) {
                    Ok(description) => {
                        debug!("Cached description for {} available", key);
                        return Ok(description);
                    }
                    Err(err) => warn!("Cached description for {} is unusable: {}", key, err),
                }
            } else {
                debug!("Cached description for {} expired", key);
            }
        }

        match self.refresh(&key, existing.as_ref()).await {
            Ok(description) => Ok(description),
            Err(err) if self.stale_policy == StalePolicy::ServeStale && err.is_refresh_failure() => {
                match existing.as_ref().map(|entry| self.describe(entry)) {
                    Some(Ok(stale)) => {
                        warn!(
                            "Refresh for {} failed ({}); serving description fetched at {}",
                            key, err, stale.fetched_at
                        );
                        Ok(stale)
                    }
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Forces the next `get` for this authority to refresh
    pub async fn invalidate(&self, authority: &str) -> Result<(), ResolutionError> {
        let key = authority.to_ascii_lowercase();
        debug!("Invalidating cached description for {}", key);
        self.store.remove(&key).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, ResolutionError> {
        match self.store.load(key).await {
            Ok(entry) => Ok(entry),
            Err(StoreError::Json(err)) => {
                warn!("Discarding undecodable cache entry for {}: {}", key, err);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn describe(&self, entry: &CacheEntry) -> Result<ServiceDescription, ResolutionError> {
        parse_authority_wsdl(&entry.authority, &entry.document, entry.fetched_at, self.ttl).map_err(
            |err| ResolutionError::DescriptionFetchFailed {
                authority: entry.authority.clone(),
                cause: err.to_string(),
            },
        )
    }

    async fn refresh(
        &self,
        key: &str,
        previous: Option<&CacheEntry>,
    ) -> Result<ServiceDescription, ResolutionError> {
        let endpoint = self.resolver.resolve(key).await?;
        info!("Fetching authority description from {}", endpoint.wsdl_url);
        let document = self.fetch_document(&endpoint).await?;

        // A refresh never backdates the stored timestamp
        let now = self.clock.now();
        let fetched_at = previous.map_or(now, |p| p.fetched_at.max(now));

        let entry = CacheEntry {
            authority: key.to_string(),
            endpoint,
            document,
            fetched_at,
        };
        let description = self.describe(&entry)?;
        self.store.save(key, &entry).await?;
        Ok(description)
    }

    async fn fetch_document(&self, endpoint: &AuthorityEndpoint) -> Result<String, ResolutionError> {
        let failed = |cause: String| ResolutionError::DescriptionFetchFailed {
            authority: endpoint.authority.clone(),
            cause,
        };

        let request = HttpRequest::get(endpoint.wsdl_url.clone());
        let response = tokio::time::timeout(self.timeout, self.http.fetch(request))
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !response.is_success() {
            return Err(failed(format!(
                "HTTP {} when fetching {}",
                response.status, endpoint.wsdl_url
            )));
        }

        String::from_utf8(response.body).map_err(|e| failed(format!("document is not UTF-8: {}", e)))
    }
}

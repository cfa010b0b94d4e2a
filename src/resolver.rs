//! Core LSID resolution functionality.
//!
//! This module ties the resolution stages together: the LSID is parsed, the
//! authority description is taken from the cache (or discovered and fetched),
//! the authority is asked which services it offers for the object, and finally
//! the requested operation is invoked.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::authority::AuthorityResolver;
use crate::cache::{CacheStore, Clock, DescriptionCache, FileStore, MemoryStore, SystemClock};
use crate::client::ServiceClient;
use crate::error::{FetchError, ResolutionError};
use crate::lsid::LsidIdentifier;
use crate::transport::{DnsLookup, HickoryDns, HttpFetch, ReqwestFetcher};
use crate::types::{OperationKind, ResolutionResult, ResolverConfig, ServiceDescription};

/// Core resolver for LSID resolution
#[derive(Clone)]
pub struct Resolver {
    /// Cache of authority descriptions
    cache: DescriptionCache,
    /// Client for the remote operations
    client: ServiceClient,
}

impl Resolver {
    /// Creates a resolver using the system DNS configuration and a `reqwest` client
    ///
    /// Descriptions are persisted under `config.cache_dir` when set, in memory otherwise.
    pub fn new(config: ResolverConfig) -> Result<Self, FetchError> {
        let dns: Arc<dyn DnsLookup> = Arc::new(HickoryDns::from_system_conf(config.timeout));
        let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&config.user_agent, config.timeout)?);
        let store: Arc<dyn CacheStore> = match &config.cache_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_collaborators(config, dns, http, store, Arc::new(SystemClock)))
    }

    /// Creates a resolver from explicit collaborators
    pub fn with_collaborators(
        config: ResolverConfig,
        dns: Arc<dyn DnsLookup>,
        http: Arc<dyn HttpFetch>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authority = AuthorityResolver::new(dns, config.timeout, config.well_known_fallback);
        let cache = DescriptionCache::new(
            authority,
            http.clone(),
            store,
            clock.clone(),
            config.ttl,
            config.timeout,
        )
        .with_stale_policy(config.stale_policy);
        let client = ServiceClient::new(http, clock, config.timeout, config.ttl);

        Self { cache, client }
    }

    /// The description cache shared by all resolutions of this resolver
    pub fn cache(&self) -> &DescriptionCache {
        &self.cache
    }

    /// Resolves an LSID to its metadata
    ///
    /// # Example
    /// ```no_run
    /// use lsid_resolver::{Resolver, ResolverConfig, ResolutionResult};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let resolver = Resolver::new(ResolverConfig::default())?;
    ///     if let ResolutionResult::Metadata(payload) =
    ///         resolver.resolve_metadata("urn:lsid:ipni.org:names:20012728-1").await?
    ///     {
    ///         println!("{}", String::from_utf8_lossy(&payload.bytes));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn resolve_metadata(&self, raw: &str) -> Result<ResolutionResult, ResolutionError> {
        self.resolve(raw, OperationKind::Metadata).await
    }

    /// Resolves an LSID to its data
    pub async fn resolve_data(&self, raw: &str) -> Result<ResolutionResult, ResolutionError> {
        self.resolve(raw, OperationKind::Data).await
    }

    /// Returns the operations the authority offers for an LSID
    pub async fn available_services(&self, raw: &str) -> Result<ServiceDescription, ResolutionError> {
        let id = LsidIdentifier::parse(raw)?;
        let authority = self.cache.get(id.authority()).await?;
        self.services_for(&authority, &id).await
    }

    /// Resolves an LSID with the given operation
    ///
    /// Any stage failure is returned unchanged and stops the resolution.
    pub async fn resolve(
        &self,
        raw: &str,
        operation: OperationKind,
    ) -> Result<ResolutionResult, ResolutionError> {
        let start_time = Instant::now();

        let id = LsidIdentifier::parse(raw)?;
        debug!("Valid LSID, authority part: {}", id.authority());

        let authority = self.cache.get(id.authority()).await?;
        let services = self.services_for(&authority, &id).await?;
        if operation == OperationKind::AvailableServices {
            return Ok(ResolutionResult::AvailableServices(services));
        }

        let result = self.client.invoke(&services, operation, &id).await?;
        info!("Resolved {} via {} in {:?}", id, operation, start_time.elapsed());
        Ok(result)
    }

    async fn services_for(
        &self,
        authority: &ServiceDescription,
        id: &LsidIdentifier,
    ) -> Result<ServiceDescription, ResolutionError> {
        match self
            .client
            .invoke(authority, OperationKind::AvailableServices, id)
            .await?
        {
            ResolutionResult::AvailableServices(services) => Ok(services),
            _ => Err(ResolutionError::TransportError(
                "getAvailableServices returned no service description".to_string(),
            )),
        }
    }
}

/// Convenience function for resolving an LSID without keeping a Resolver around
pub async fn resolve_lsid(
    raw: &str,
    operation: OperationKind,
    config: Option<ResolverConfig>,
) -> Result<ResolutionResult, ResolutionError> {
    let resolver = Resolver::new(config.unwrap_or_default())
        .map_err(|e| ResolutionError::TransportError(e.to_string()))?;
    resolver.resolve(raw, operation).await
}

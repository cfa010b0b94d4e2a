//! Core types for LSID resolution.
//!
//! This module provides the data structures shared by the resolution stages:
//! resolved authority endpoints, parsed service descriptions, cache entries,
//! invocation results and the resolver configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// The operations an LSID service can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Metadata,
    Data,
    AvailableServices,
}

impl OperationKind {
    /// Operation name as it appears on the wire
    pub fn operation_name(&self) -> &'static str {
        match self {
            OperationKind::Metadata => "getMetadata",
            OperationKind::Data => "getData",
            OperationKind::AvailableServices => "getAvailableServices",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation_name())
    }
}

/// How an operation is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Plain HTTP GET with the LSID as a query parameter
    HttpGet { location: Url },
    /// SOAP 1.1 POST to the given endpoint
    Soap { location: Url },
}

impl Binding {
    pub fn location(&self) -> &Url {
        match self {
            Binding::HttpGet { location } | Binding::Soap { location } => location,
        }
    }

    pub fn style(&self) -> &'static str {
        match self {
            Binding::HttpGet { .. } => "http",
            Binding::Soap { .. } => "soap",
        }
    }
}

/// A resolved network location of an authority's resolution service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityEndpoint {
    /// The authority this endpoint was discovered for
    pub authority: String,
    /// Target host, without the trailing root dot
    pub host: String,
    /// Target port
    pub port: u16,
    /// URL of the authority WSDL
    pub wsdl_url: Url,
}

/// Parsed WSDL description of a set of LSID operations
///
/// Descriptions are immutable once built; the cache hands out clones that
/// share the underlying document.
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// The authority that published the description
    pub authority: String,
    /// When the document was fetched
    pub fetched_at: DateTime<Utc>,
    /// When the description stops being valid
    pub expires_at: DateTime<Utc>,
    /// The raw WSDL document
    pub document: Arc<str>,
    operations: BTreeMap<OperationKind, Binding>,
}

impl ServiceDescription {
    pub fn new(
        authority: impl Into<String>,
        document: impl Into<Arc<str>>,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
        operations: BTreeMap<OperationKind, Binding>,
    ) -> Self {
        Self {
            authority: authority.into(),
            fetched_at,
            expires_at: fetched_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            document: document.into(),
            operations,
        }
    }

    pub fn binding(&self, operation: OperationKind) -> Option<&Binding> {
        self.operations.get(&operation)
    }

    pub fn supports(&self, operation: OperationKind) -> bool {
        self.operations.contains_key(&operation)
    }

    /// The advertised operations in a stable order
    pub fn operations(&self) -> impl Iterator<Item = (OperationKind, &Binding)> {
        self.operations.iter().map(|(kind, binding)| (*kind, binding))
    }
}

/// A stored authority description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The authority the entry is keyed by
    pub authority: String,
    /// Where the description was fetched from
    pub endpoint: AuthorityEndpoint,
    /// The raw authority WSDL
    pub document: String,
    /// When the document was fetched
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is valid while `now - fetched_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

/// An opaque payload returned by a metadata or data call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Declared MIME type, if the service sent one
    pub content_type: Option<String>,
    /// The payload exactly as received
    pub bytes: Vec<u8>,
}

/// Result of a successful invocation
#[derive(Debug, Clone)]
pub enum ResolutionResult {
    /// Metadata document for the object
    Metadata(Payload),
    /// The object's data
    Data(Payload),
    /// The operations the authority offers for the object
    AvailableServices(ServiceDescription),
}

/// What to do when a refresh fails but an expired entry is still stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Surface the refresh failure
    #[default]
    Fail,
    /// Serve the expired description and log a warning
    ServeStale,
}

/// Options for the resolver and its collaborators
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a fetched authority description stays valid
    pub ttl: Duration,
    /// Upper bound for every DNS and HTTP call
    pub timeout: std::time::Duration,
    /// Refresh failure handling
    pub stale_policy: StalePolicy,
    /// Fall back to `https://<authority>/authority/` when no SRV record exists
    pub well_known_fallback: bool,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
    /// Directory for persisted descriptions; in-memory when `None`
    pub cache_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::days(2),
            timeout: std::time::Duration::from_secs(120),
            stale_policy: StalePolicy::Fail,
            well_known_fallback: true,
            user_agent: concat!("lsid-resolver/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_dir: None,
        }
    }
}

impl ResolverConfig {
    /// Negative lifetimes are treated as zero
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.max(Duration::zero());
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_well_known_fallback(mut self, enabled: bool) -> Self {
        self.well_known_fallback = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

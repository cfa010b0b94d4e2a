//! Authority discovery.
//!
//! An authority publishes its resolution service through a DNS SRV record at
//! `_lsid._tcp.<authority>`. When no such record exists the resolver can fall
//! back to the conventional `https://<authority>/authority/` location.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{DnsError, ResolutionError};
use crate::transport::{DnsLookup, SrvRecord};
use crate::types::AuthorityEndpoint;

const FALLBACK_PORT: u16 = 443;

/// Maps authority names to the location of their authority WSDL
#[derive(Clone)]
pub struct AuthorityResolver {
    dns: Arc<dyn DnsLookup>,
    timeout: Duration,
    well_known_fallback: bool,
}

impl AuthorityResolver {
    pub fn new(dns: Arc<dyn DnsLookup>, timeout: Duration, well_known_fallback: bool) -> Self {
        Self {
            dns,
            timeout,
            well_known_fallback,
        }
    }

    /// Resolves an authority to its resolution service endpoint
    pub async fn resolve(&self, authority: &str) -> Result<AuthorityEndpoint, ResolutionError> {
        let name = format!("_lsid._tcp.{}", authority);
        debug!("Querying SRV record {}", name);

        match self.bounded(&name, self.dns.lookup_srv(&name)).await {
            Ok(records) => match select_record(&records) {
                Some(record) => endpoint_from_srv(authority, record),
                None => self.fallback(authority).await,
            },
            Err(DnsError::NoRecords(_)) | Err(DnsError::NxDomain(_)) => {
                self.fallback(authority).await
            }
            Err(err) => Err(unreachable(authority, err)),
        }
    }

    async fn fallback(&self, authority: &str) -> Result<AuthorityEndpoint, ResolutionError> {
        if !self.well_known_fallback {
            return Err(ResolutionError::NoResolutionService {
                authority: authority.to_string(),
            });
        }

        // The authority host itself has to exist before we guess a location on it
        let addresses = self
            .bounded(authority, self.dns.lookup_host(authority))
            .await
            .map_err(|err| unreachable(authority, err))?;
        if addresses.is_empty() {
            return Err(unreachable(authority, DnsError::NoRecords(authority.to_string())));
        }

        debug!("No SRV record for {}, using well-known location", authority);
        build_endpoint(authority, authority, FALLBACK_PORT)
    }

    async fn bounded<T>(
        &self,
        name: &str,
        lookup: impl Future<Output = Result<T, DnsError>>,
    ) -> Result<T, DnsError> {
        tokio::time::timeout(self.timeout, lookup)
            .await
            .unwrap_or_else(|_| Err(DnsError::Timeout(name.to_string())))
    }
}

fn unreachable(authority: &str, err: DnsError) -> ResolutionError {
    ResolutionError::AuthorityUnreachable {
        authority: authority.to_string(),
        cause: err.to_string(),
    }
}

/// Lowest priority wins, ties go to the heaviest record
fn select_record(records: &[SrvRecord]) -> Option<&SrvRecord> {
    records
        .iter()
        .filter(|r| !r.target.trim_end_matches('.').is_empty())
        .min_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)))
}

fn endpoint_from_srv(authority: &str, record: &SrvRecord) -> Result<AuthorityEndpoint, ResolutionError> {
    let host = record.target.trim_end_matches('.');
    debug!("Service target: {} | Port: {}", host, record.port);
    build_endpoint(authority, host, record.port)
}

fn build_endpoint(authority: &str, host: &str, port: u16) -> Result<AuthorityEndpoint, ResolutionError> {
    let scheme = if port == 443 { "https" } else { "http" };
    let wsdl_url = Url::parse(&format!("{}://{}:{}/authority/", scheme, host, port)).map_err(|_| {
        ResolutionError::NoResolutionService {
            authority: authority.to_string(),
        }
    })?;

    Ok(AuthorityEndpoint {
        authority: authority.to_string(),
        host: host.to_string(),
        port,
        wsdl_url,
    })
}

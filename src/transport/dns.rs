//! DNS lookups through the system resolver configuration.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use tracing::warn;

use super::{DnsLookup, SrvRecord};
use crate::error::DnsError;

/// [`DnsLookup`] backed by `hickory-resolver`
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    /// Builds a resolver from `/etc/resolv.conf` (or the platform equivalent),
    /// falling back to the library defaults when that cannot be read
    pub fn from_system_conf(timeout: Duration) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|e| {
                warn!("Failed to read system DNS configuration, using defaults: {}", e);
                (ResolverConfig::default(), ResolverOpts::default())
            });
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

fn map_error(name: &str, err: ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                DnsError::NxDomain(name.to_string())
            } else {
                DnsError::NoRecords(name.to_string())
            }
        }
        ResolveErrorKind::Timeout => DnsError::Timeout(name.to_string()),
        _ => DnsError::Failed(err.to_string()),
    }
}

#[async_trait]
impl DnsLookup for HickoryDns {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DnsError> {
        let lookup = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|e| map_error(name, e))?;

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_utf8(),
            })
            .collect())
    }

    async fn lookup_host(&self, name: &str) -> Result<Vec<IpAddr>, DnsError> {
        let lookup = self
            .resolver
            .lookup_ip(name)
            .await
            .map_err(|e| map_error(name, e))?;
        Ok(lookup.iter().collect())
    }
}

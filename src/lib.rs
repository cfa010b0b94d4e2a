//! A client-side resolver for Life Science Identifiers (LSIDs).
//!
//! This library resolves identifiers of the form
//! `urn:lsid:<authority>:<namespace>:<object>[:<revision>]` following the LSID
//! resolution protocol: the authority's resolution service is discovered
//! through DNS, its WSDL service description is fetched (and cached for two
//! days by default), and the `getMetadata`/`getData` operations are invoked for
//! the identified object. It does not assign or publish LSIDs.

mod authority;
mod cache;
mod client;
mod error;
mod lsid;
mod resolver;
mod transport;
mod types;
mod wsdl;

pub use authority::AuthorityResolver;
pub use cache::{CacheStore, Clock, DescriptionCache, FileStore, MemoryStore, SystemClock};
pub use client::ServiceClient;
pub use error::{DnsError, ErrorKind, FetchError, ResolutionError, StoreError, WsdlError};
pub use lsid::LsidIdentifier;
pub use resolver::{resolve_lsid, Resolver};
pub use transport::{
    DnsLookup, HickoryDns, HttpFetch, HttpRequest, HttpResponse, Method, ReqwestFetcher, SrvRecord,
};
pub use types::{
    AuthorityEndpoint, Binding, CacheEntry, OperationKind, Payload, ResolutionResult,
    ResolverConfig, ServiceDescription, StalePolicy,
};
pub use wsdl::{parse_authority_wsdl, parse_service_wsdl};

/// Resolves an LSID with optional resolver configuration
///
/// # Arguments
/// * `lsid` - The LSID to resolve
/// * `operation` - Which operation to invoke for the identified object
/// * `config` - Optional resolver configuration
///
/// # Example
/// ```no_run
/// use lsid_resolver::{resolve, OperationKind};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let result = resolve(
///         "urn:lsid:ipni.org:names:20012728-1",
///         OperationKind::Metadata,
///         None
///     ).await?;
///
///     println!("Resolved: {:?}", result);
///     Ok(())
/// }
/// ```
pub async fn resolve(
    lsid: &str,
    operation: OperationKind,
    config: Option<ResolverConfig>,
) -> Result<ResolutionResult, ResolutionError> {
    resolve_lsid(lsid, operation, config).await
}

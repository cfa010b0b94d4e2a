//! Error types for LSID resolution operations.
//!
//! Every stage of a resolution reports through [`ResolutionError`]. Lower layers
//! have their own error enums ([`DnsError`], [`FetchError`], [`StoreError`],
//! [`WsdlError`]) which are wrapped, with the authority as context, when they
//! cross into the resolution taxonomy.

use thiserror::Error;

use crate::types::OperationKind;

/// Errors that can occur during LSID resolution operations
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The LSID does not follow the `urn:lsid:authority:namespace:object[:revision]` grammar
    #[error("Malformed LSID '{input}': {reason}")]
    MalformedLsid { input: String, reason: String },

    /// DNS resolution for the authority failed or timed out
    #[error("Authority '{authority}' is unreachable: {cause}")]
    AuthorityUnreachable { authority: String, cause: String },

    /// DNS answered but the authority advertises no usable resolution service
    #[error("No LSID resolution service found for authority '{authority}'")]
    NoResolutionService { authority: String },

    /// The authority WSDL could not be fetched or understood
    #[error("Failed to fetch service description for '{authority}': {cause}")]
    DescriptionFetchFailed { authority: String, cause: String },

    /// The service description does not advertise the requested operation
    #[error("Authority '{authority}' does not offer {operation}")]
    UnsupportedOperation {
        authority: String,
        operation: OperationKind,
    },

    /// The remote service answered with a protocol-level fault
    #[error("Remote fault {code}: {message}")]
    RemoteFault { code: String, message: String },

    /// Network-level failure during invocation
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The cache medium failed
    #[error("Cache storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Coarse classification of a [`ResolutionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedLsid,
    AuthorityUnreachable,
    NoResolutionService,
    DescriptionFetchFailed,
    UnsupportedOperation,
    RemoteFault,
    TransportError,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedLsid => "malformed-lsid",
            ErrorKind::AuthorityUnreachable => "authority-unreachable",
            ErrorKind::NoResolutionService => "no-resolution-service",
            ErrorKind::DescriptionFetchFailed => "description-fetch-failed",
            ErrorKind::UnsupportedOperation => "unsupported-operation",
            ErrorKind::RemoteFault => "remote-fault",
            ErrorKind::TransportError => "transport-error",
            ErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResolutionError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        ResolutionError::MalformedLsid {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolutionError::MalformedLsid { .. } => ErrorKind::MalformedLsid,
            ResolutionError::AuthorityUnreachable { .. } => ErrorKind::AuthorityUnreachable,
            ResolutionError::NoResolutionService { .. } => ErrorKind::NoResolutionService,
            ResolutionError::DescriptionFetchFailed { .. } => ErrorKind::DescriptionFetchFailed,
            ResolutionError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            ResolutionError::RemoteFault { .. } => ErrorKind::RemoteFault,
            ResolutionError::TransportError(_) => ErrorKind::TransportError,
            ResolutionError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Process exit status the command-line front end reports for this error
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::MalformedLsid => 2,
            ErrorKind::AuthorityUnreachable
            | ErrorKind::NoResolutionService
            | ErrorKind::DescriptionFetchFailed
            | ErrorKind::TransportError => 3,
            ErrorKind::RemoteFault => 4,
            ErrorKind::UnsupportedOperation | ErrorKind::Storage => 1,
        }
    }

    /// Whether a stale cached description may stand in after this refresh failure
    pub(crate) fn is_refresh_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthorityUnreachable
                | ErrorKind::NoResolutionService
                | ErrorKind::DescriptionFetchFailed
        )
    }
}

/// DNS lookup failures reported by a [`crate::transport::DnsLookup`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// The name exists but carries no record of the requested type
    #[error("no records found for {0}")]
    NoRecords(String),

    /// The name does not exist
    #[error("{0} does not exist (NXDOMAIN)")]
    NxDomain(String),

    /// The lookup did not complete in time
    #[error("DNS lookup for {0} timed out")]
    Timeout(String),

    /// Any other resolver failure
    #[error("DNS lookup failed: {0}")]
    Failed(String),
}

/// HTTP transport failures reported by a [`crate::transport::HttpFetch`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// Failures of the cache medium
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The key cannot be used as a storage name
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
}

/// Problems found while reading a WSDL document or SOAP envelope
#[derive(Error, Debug)]
pub enum WsdlError {
    /// XML parse error
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document root is not `wsdl:definitions`
    #[error("not a WSDL document (root element is '{0}')")]
    NotWsdl(String),

    /// No port with the required binding was found
    #[error("no {0} port found")]
    MissingBinding(&'static str),

    /// URL parse error
    #[error("invalid address location '{location}': {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    /// The SOAP response is not an envelope with a body
    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let cases = vec![
            (ResolutionError::malformed("urn:x", "missing prefix"), 2),
            (
                ResolutionError::AuthorityUnreachable {
                    authority: "ipni.org".to_string(),
                    cause: "timed out".to_string(),
                },
                3,
            ),
            (
                ResolutionError::NoResolutionService {
                    authority: "ipni.org".to_string(),
                },
                3,
            ),
            (
                ResolutionError::DescriptionFetchFailed {
                    authority: "ipni.org".to_string(),
                    cause: "HTTP 500".to_string(),
                },
                3,
            ),
            (ResolutionError::TransportError("refused".to_string()), 3),
            (
                ResolutionError::RemoteFault {
                    code: "404".to_string(),
                    message: "unknown LSID".to_string(),
                },
                4,
            ),
            (
                ResolutionError::UnsupportedOperation {
                    authority: "ipni.org".to_string(),
                    operation: OperationKind::Data,
                },
                1,
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.exit_code(), code, "{}", error);
        }
    }

    #[test]
    fn test_only_discovery_failures_allow_stale_serving() {
        assert!(ResolutionError::NoResolutionService {
            authority: "a.org".to_string()
        }
        .is_refresh_failure());
        assert!(!ResolutionError::TransportError("x".to_string()).is_refresh_failure());
        assert!(!ResolutionError::malformed("x", "y").is_refresh_failure());
    }
}

//! Network collaborators used by the resolution stages.
//!
//! The engine only depends on the [`DnsLookup`] and [`HttpFetch`] capabilities;
//! [`HickoryDns`] and [`ReqwestFetcher`] are the production implementations.

mod dns;
mod http;

pub use dns::HickoryDns;
pub use http::ReqwestFetcher;

use std::net::IpAddr;

use async_trait::async_trait;
use url::Url;

use crate::error::{DnsError, FetchError};

/// One DNS SRV answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    /// Target host, possibly with a trailing root dot
    pub target: String,
}

/// DNS capability
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Looks up the SRV records published under `name`
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DnsError>;

    /// Looks up the addresses of a host
    async fn lookup_host(&self, name: &str) -> Result<Vec<IpAddr>, DnsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outgoing HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A received HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP capability
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

//! Invocation of LSID service operations.
//!
//! The client only ever calls an operation that the given description
//! advertises, and performs no retries.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::debug;

use crate::cache::Clock;
use crate::error::{ResolutionError, WsdlError};
use crate::lsid::LsidIdentifier;
use crate::transport::{HttpFetch, HttpRequest, HttpResponse};
use crate::types::{Binding, OperationKind, Payload, ResolutionResult, ServiceDescription};
use crate::wsdl::{parse_service_wsdl, parse_soap_response, soap_fault, SoapReply};

/// Longest response excerpt carried in a fault message
const FAULT_EXCERPT: usize = 200;

/// Client for the operations described by a [`ServiceDescription`]
#[derive(Clone)]
pub struct ServiceClient {
    http: Arc<dyn HttpFetch>,
    clock: Arc<dyn Clock>,
    timeout: StdDuration,
    ttl: Duration,
}

impl ServiceClient {
    /// `ttl` is the validity given to per-object descriptions returned by
    /// `getAvailableServices`
    pub fn new(
        http: Arc<dyn HttpFetch>,
        clock: Arc<dyn Clock>,
        timeout: StdDuration,
        ttl: Duration,
    ) -> Self {
        Self {
            http,
            clock,
            timeout,
            ttl,
        }
    }

    /// Invokes `operation` for `id` against the binding named in `description`
    pub async fn invoke(
        &self,
        description: &ServiceDescription,
        operation: OperationKind,
        id: &LsidIdentifier,
    ) -> Result<ResolutionResult, ResolutionError> {
        let binding = description
            .binding(operation)
            .ok_or_else(|| ResolutionError::UnsupportedOperation {
                authority: description.authority.clone(),
                operation,
            })?;

        let lsid = id.to_string();
        let request = build_request(binding, operation, &lsid);
        debug!("Invoking {} at {}", operation, request.url);

        let response = tokio::time::timeout(self.timeout, self.http.fetch(request))
            .await
            .map_err(|_| {
                ResolutionError::TransportError(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                ))
            })?
            .map_err(|e| ResolutionError::TransportError(e.to_string()))?;

        let payload = read_payload(binding, response)?;

        match operation {
            OperationKind::Metadata => Ok(ResolutionResult::Metadata(payload)),
            OperationKind::Data => Ok(ResolutionResult::Data(payload)),
            OperationKind::AvailableServices => {
                let document = String::from_utf8(payload.bytes).map_err(|e| {
                    ResolutionError::TransportError(format!("service description is not UTF-8: {}", e))
                })?;
                let services = parse_service_wsdl(&description.authority, &document, self.clock.now(), self.ttl)
                    .map_err(|e| malformed(operation, e))?;
                Ok(ResolutionResult::AvailableServices(services))
            }
        }
    }
}

fn build_request(binding: &Binding, operation: OperationKind, lsid: &str) -> HttpRequest {
    match binding {
        Binding::HttpGet { location } => {
            let mut url = location.clone();
            url.query_pairs_mut().append_pair("lsid", lsid);
            HttpRequest::get(url)
        }
        Binding::Soap { location } => {
            HttpRequest::post(location.clone(), crate::wsdl::soap_request(operation, lsid))
                .header("Content-Type", "text/xml; charset=utf-8")
                .header("SOAPAction", "\"\"")
        }
    }
}

fn read_payload(binding: &Binding, response: HttpResponse) -> Result<Payload, ResolutionError> {
    if !response.is_success() {
        let (code, message) = soap_fault(&response.body).unwrap_or_else(|| {
            (
                response.status.to_string(),
                excerpt(&response.body).unwrap_or_else(|| "no response body".to_string()),
            )
        });
        return Err(ResolutionError::RemoteFault { code, message });
    }

    match binding {
        Binding::HttpGet { .. } => Ok(Payload {
            content_type: response.content_type,
            bytes: response.body,
        }),
        Binding::Soap { .. } => match parse_soap_response(&response.body) {
            Ok(SoapReply::Body(bytes)) => Ok(Payload {
                content_type: response.content_type,
                bytes,
            }),
            Ok(SoapReply::Fault { code, message }) => Err(ResolutionError::RemoteFault { code, message }),
            Err(e) => Err(ResolutionError::TransportError(e.to_string())),
        },
    }
}

fn excerpt(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(FAULT_EXCERPT).collect())
}

fn malformed(operation: OperationKind, err: WsdlError) -> ResolutionError {
    ResolutionError::TransportError(format!("malformed {} response: {}", operation, err))
}

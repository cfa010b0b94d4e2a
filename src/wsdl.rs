//! WSDL service descriptions and SOAP envelopes.
//!
//! Authority and per-object service WSDL documents are reduced to a closed set
//! of [`OperationKind`] → [`Binding`] pairs. Nothing else in the document is
//! interpreted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use roxmltree::{Document, Node};
use url::Url;

use crate::error::WsdlError;
use crate::types::{Binding, OperationKind, ServiceDescription};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const AUTHORITY_SOAP_NS: &str = "http://www.omg.org/LSID/2003/AuthorityServiceSOAPBindings";
const DATA_SOAP_NS: &str = "http://www.omg.org/LSID/2003/DataServiceSOAPBindings";

/// Path of the getAvailableServices call below an HTTP authority binding
const AVAILABLE_SERVICES_PATH: &str = "authority/";

/// A port found under `wsdl:service`
struct Port<'a> {
    binding: &'a str,
    location: &'a str,
}

fn ports<'a, 'input: 'a>(doc: &'a Document<'input>) -> Result<Vec<Port<'a>>, WsdlError> {
    let root = doc.root_element();
    if root.tag_name().name() != "definitions" {
        return Err(WsdlError::NotWsdl(root.tag_name().name().to_string()));
    }

    let ports = root
        .children()
        .filter(|n| is_local(n, "service"))
        .flat_map(|service| service.children().filter(|n| is_local(n, "port")))
        .filter_map(|port| {
            let binding = port.attribute("binding")?;
            let location = port
                .children()
                .find(|n| is_local(n, "address"))?
                .attribute("location")?;
            Some(Port {
                // Only the local part of the binding QName matters
                binding: binding.rsplit(':').next().unwrap_or(binding),
                location,
            })
        })
        .collect();

    Ok(ports)
}

fn is_local(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn parse_location(location: &str) -> Result<Url, WsdlError> {
    Url::parse(location.trim()).map_err(|source| WsdlError::InvalidLocation {
        location: location.to_string(),
        source,
    })
}

/// Picks the binding for an operation, HTTP GET before SOAP
fn find_binding(ports: &[Port], http_suffix: &str, soap_suffix: &str) -> Result<Option<Binding>, WsdlError> {
    if let Some(port) = ports.iter().find(|p| p.binding.ends_with(http_suffix)) {
        return Ok(Some(Binding::HttpGet {
            location: parse_location(port.location)?,
        }));
    }
    if let Some(port) = ports.iter().find(|p| p.binding.ends_with(soap_suffix)) {
        return Ok(Some(Binding::Soap {
            location: parse_location(port.location)?,
        }));
    }
    Ok(None)
}

/// Builds the getAvailableServices URL from an HTTP authority binding location
fn available_services_url(mut base: Url) -> Url {
    let path = base.path().trim_end_matches('/').to_string();
    if path.ends_with("/authority") {
        base.set_path(&format!("{}/", path));
    } else {
        base.set_path(&format!("{}/{}", path, AVAILABLE_SERVICES_PATH));
    }
    base
}

/// Parses an authority WSDL into a description offering `getAvailableServices`
pub fn parse_authority_wsdl(
    authority: &str,
    document: &str,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<ServiceDescription, WsdlError> {
    let doc = Document::parse(document)?;
    let ports = ports(&doc)?;

    let binding = match find_binding(&ports, "LSIDAuthorityHTTPBinding", "LSIDAuthoritySOAPBinding")? {
        Some(Binding::HttpGet { location }) => Binding::HttpGet {
            location: available_services_url(location),
        },
        Some(soap) => soap,
        None => return Err(WsdlError::MissingBinding("LSID authority")),
    };

    let mut operations = BTreeMap::new();
    operations.insert(OperationKind::AvailableServices, binding);
    Ok(ServiceDescription::new(authority, document, fetched_at, ttl, operations))
}

/// Parses a per-object service WSDL into a description of its metadata and data operations
///
/// A document that advertises neither operation is still a valid, empty description.
pub fn parse_service_wsdl(
    authority: &str,
    document: &str,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<ServiceDescription, WsdlError> {
    let doc = Document::parse(document)?;
    let ports = ports(&doc)?;

    let mut operations = BTreeMap::new();
    if let Some(binding) = find_binding(&ports, "LSIDMetadataHTTPBinding", "LSIDMetadataSOAPBinding")? {
        operations.insert(OperationKind::Metadata, binding);
    }
    if let Some(binding) = find_binding(&ports, "LSIDDataHTTPBinding", "LSIDDataSOAPBinding")? {
        operations.insert(OperationKind::Data, binding);
    }

    Ok(ServiceDescription::new(authority, document, fetched_at, ttl, operations))
}

/// Builds the SOAP 1.1 request envelope for an operation
pub fn soap_request(operation: OperationKind, lsid: &str) -> String {
    let ns = match operation {
        OperationKind::AvailableServices => AUTHORITY_SOAP_NS,
        OperationKind::Metadata | OperationKind::Data => DATA_SOAP_NS,
    };
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="{env}">"#,
            r#"<soapenv:Body><lsid:{op} xmlns:lsid="{ns}"><lsid>{id}</lsid></lsid:{op}></soapenv:Body>"#,
            r#"</soapenv:Envelope>"#
        ),
        env = SOAP_ENV_NS,
        op = operation.operation_name(),
        ns = ns,
        id = escape_xml(lsid),
    )
}

/// A decoded SOAP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapReply {
    /// The serialized first child of `Body`, carrying the namespace
    /// declarations it inherits from the envelope
    Body(Vec<u8>),
    Fault { code: String, message: String },
}

/// Decodes a SOAP response envelope
pub fn parse_soap_response(body: &[u8]) -> Result<SoapReply, WsdlError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| WsdlError::MalformedEnvelope(format!("response is not UTF-8: {}", e)))?;
    let doc = Document::parse(text)?;

    let envelope = doc.root_element();
    if !envelope.has_tag_name((SOAP_ENV_NS, "Envelope")) {
        return Err(WsdlError::MalformedEnvelope(format!(
            "root element is '{}'",
            envelope.tag_name().name()
        )));
    }
    let soap_body = envelope
        .children()
        .find(|n| n.has_tag_name((SOAP_ENV_NS, "Body")))
        .ok_or_else(|| WsdlError::MalformedEnvelope("missing Body".to_string()))?;

    if let Some(fault) = soap_body.children().find(|n| n.has_tag_name((SOAP_ENV_NS, "Fault"))) {
        return Ok(fault_of(fault));
    }

    let payload = match soap_body.children().find(|n| n.is_element()) {
        Some(child) => standalone(text, child).into_bytes(),
        None => soap_body.text().unwrap_or_default().trim().as_bytes().to_vec(),
    };
    Ok(SoapReply::Body(payload))
}

/// Extracts a SOAP fault from a response body, if it carries one
pub fn soap_fault(body: &[u8]) -> Option<(String, String)> {
    match parse_soap_response(body) {
        Ok(SoapReply::Fault { code, message }) => Some((code, message)),
        _ => None,
    }
}

fn fault_of(fault: Node) -> SoapReply {
    let field = |name: &str| {
        fault
            .children()
            .find(|n| is_local(n, name))
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
    };
    SoapReply::Fault {
        code: field("faultcode").unwrap_or_else(|| "soap:Server".to_string()),
        message: field("faultstring").unwrap_or_default(),
    }
}

/// Serializes an element so that it parses on its own
///
/// Namespaces used inside the element but declared on an ancestor are
/// declared again on the element itself.
fn standalone(text: &str, node: Node) -> String {
    let fragment = &text[node.range()];
    let start_tag = &fragment[..start_tag_len(fragment)];

    let used: BTreeSet<&str> = node
        .descendants()
        .filter(|n| n.is_element())
        .flat_map(|n| {
            n.tag_name()
                .namespace()
                .into_iter()
                .chain(n.attributes().filter_map(|a| a.namespace()))
        })
        .collect();

    let mut declarations = String::new();
    for ns in node.namespaces() {
        if ns.name() == Some("xml") || ns.uri().is_empty() || !used.contains(ns.uri()) {
            continue;
        }
        let attr = match ns.name() {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        if !declares(start_tag, &attr) {
            declarations.push_str(&format!(" {}=\"{}\"", attr, escape_xml(ns.uri())));
        }
    }

    let name_end = fragment[1..]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .map_or(fragment.len(), |i| i + 1);
    format!("{}{}{}", &fragment[..name_end], declarations, &fragment[name_end..])
}

/// Length of the start tag at the beginning of `fragment`, quotes respected
fn start_tag_len(fragment: &str) -> usize {
    let mut quote = None;
    for (i, c) in fragment.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return i + 1,
            None => {}
        }
    }
    fragment.len()
}

fn declares(start_tag: &str, attr: &str) -> bool {
    start_tag.match_indices(attr).any(|(i, _)| {
        start_tag[..i].ends_with(char::is_whitespace)
            && start_tag[i + attr.len()..].trim_start().starts_with('=')
    })
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHORITY_WSDL: &str = include_str!("../tests/fixtures/authority.wsdl");
    const SERVICE_WSDL: &str = include_str!("../tests/fixtures/service.wsdl");

    fn ttl() -> Duration {
        Duration::days(2)
    }

    #[test]
    fn test_authority_binding_extraction() {
        let description = parse_authority_wsdl("nmbe.ch", AUTHORITY_WSDL, Utc::now(), ttl()).unwrap();

        let binding = description.binding(OperationKind::AvailableServices).unwrap();
        assert_eq!(binding.style(), "http");
        assert_eq!(binding.location().as_str(), "https://lsid.nmbe.ch/authority/");
        assert!(!description.supports(OperationKind::Metadata));
    }

    #[test]
    fn test_service_binding_extraction() {
        let description = parse_service_wsdl("nmbe.ch", SERVICE_WSDL, Utc::now(), ttl()).unwrap();

        assert_eq!(
            description.binding(OperationKind::Data).unwrap().location().as_str(),
            "https://lsid.nmbe.ch/authority/data"
        );
        assert_eq!(
            description.binding(OperationKind::Metadata).unwrap().location().as_str(),
            "https://lsid.nmbe.ch/authority/metadata"
        );
    }

    #[test]
    fn test_authority_without_binding_is_rejected() {
        let doc = r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"><service name="x"/></definitions>"#;
        assert!(matches!(
            parse_authority_wsdl("a.org", doc, Utc::now(), ttl()),
            Err(WsdlError::MissingBinding(_))
        ));
        assert!(matches!(
            parse_authority_wsdl("a.org", "<root/>", Utc::now(), ttl()),
            Err(WsdlError::NotWsdl(_))
        ));
        assert!(matches!(
            parse_authority_wsdl("a.org", "not xml", Utc::now(), ttl()),
            Err(WsdlError::Xml(_))
        ));
    }

    #[test]
    fn test_service_without_ports_is_empty() {
        let doc = r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"/>"#;
        let description = parse_service_wsdl("a.org", doc, Utc::now(), ttl()).unwrap();
        assert_eq!(description.operations().count(), 0);
    }

    #[test]
    fn test_soap_binding_used_when_no_http_binding() {
        let doc = r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
                         xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/">
            <service name="S">
              <port name="m" binding="sns:LSIDMetadataSOAPBinding">
                <soap:address location="http://lsid.example.org:8080/soap/metadata"/>
              </port>
            </service>
          </definitions>"#;
        let description = parse_service_wsdl("example.org", doc, Utc::now(), ttl()).unwrap();
        let binding = description.binding(OperationKind::Metadata).unwrap();
        assert_eq!(binding.style(), "soap");
        assert!(!description.supports(OperationKind::Data));
    }

    #[test]
    fn test_invalid_location_is_reported() {
        let doc = r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
                         xmlns:http="http://schemas.xmlsoap.org/wsdl/http/">
            <service name="S">
              <port name="d" binding="sns:LSIDDataHTTPBinding">
                <http:address location="not a url"/>
              </port>
            </service>
          </definitions>"#;
        assert!(matches!(
            parse_service_wsdl("example.org", doc, Utc::now(), ttl()),
            Err(WsdlError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_available_services_url() {
        let cases = vec![
            ("https://lsid.nmbe.ch:443", "https://lsid.nmbe.ch/authority/"),
            ("http://lsid.ipni.org/", "http://lsid.ipni.org/authority/"),
            ("http://host:8080/lsid", "http://host:8080/lsid/authority/"),
            ("http://host/authority", "http://host/authority/"),
            ("http://host/authority/", "http://host/authority/"),
        ];

        for (base, expected) in cases {
            let url = available_services_url(Url::parse(base).unwrap());
            assert_eq!(url.as_str(), expected);
        }
    }

    #[test]
    fn test_soap_request_escapes_lsid() {
        let envelope = soap_request(OperationKind::Metadata, "urn:lsid:a.org:n:o\"'");
        assert!(envelope.contains("<lsid:getMetadata"));
        assert!(envelope.contains(DATA_SOAP_NS));
        assert!(envelope.contains("urn:lsid:a.org:n:o&quot;&apos;"));

        let envelope = soap_request(OperationKind::AvailableServices, "urn:lsid:a.org:n:o");
        assert!(envelope.contains(AUTHORITY_SOAP_NS));
    }

    #[test]
    fn test_soap_fault_parsing() {
        let body = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
            <soap:Body><soap:Fault>
              <faultcode>soap:Client</faultcode>
              <faultstring>Unknown LSID</faultstring>
            </soap:Fault></soap:Body></soap:Envelope>"#;

        assert_eq!(
            parse_soap_response(body).unwrap(),
            SoapReply::Fault {
                code: "soap:Client".to_string(),
                message: "Unknown LSID".to_string()
            }
        );
        assert_eq!(
            soap_fault(body),
            Some(("soap:Client".to_string(), "Unknown LSID".to_string()))
        );
        assert_eq!(soap_fault(b"plain text"), None);
    }

    #[test]
    fn test_soap_body_payload() {
        let body = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/></soap:Body></soap:Envelope>"#;
        match parse_soap_response(body).unwrap() {
            SoapReply::Body(payload) => assert_eq!(
                payload,
                br#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/>"#.to_vec()
            ),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_soap_body_keeps_inherited_namespaces() {
        let body = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
                                    xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                                    xmlns:dc="http://purl.org/dc/elements/1.1/"
                                    xmlns:unused="urn:unused">
            <soap:Body><rdf:RDF><rdf:Description dc:title="Bellis perennis"/></rdf:RDF></soap:Body>
            </soap:Envelope>"#;

        let payload = match parse_soap_response(body).unwrap() {
            SoapReply::Body(payload) => String::from_utf8(payload).unwrap(),
            other => panic!("unexpected reply {:?}", other),
        };
        assert!(!payload.contains("urn:unused"));
        assert!(!payload.contains("soap/envelope"));

        let doc = Document::parse(&payload).unwrap();
        let rdf = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
        assert!(doc.root_element().has_tag_name((rdf, "RDF")));
        let description = doc.root_element().first_element_child().unwrap();
        assert!(description.has_tag_name((rdf, "Description")));
        assert_eq!(
            description.attribute(("http://purl.org/dc/elements/1.1/", "title")),
            Some("Bellis perennis")
        );
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            parse_soap_response(b"<html/>"),
            Err(WsdlError::MalformedEnvelope(_))
        ));
        let no_body = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        assert!(matches!(
            parse_soap_response(no_body),
            Err(WsdlError::MalformedEnvelope(_))
        ));
    }
}

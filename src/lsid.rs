//! LSID parsing and validation.
//!
//! This module handles the parsing and validation of Life Science Identifiers of
//! the form `urn:lsid:<authority>:<namespace>:<object>[:<revision>]`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ResolutionError;

const PREFIX: &str = "urn:lsid:";

/// One LSID segment: an ASCII alphanumeric followed by the LSID character set
static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z0-9][A-Za-z0-9_()+,\-.=@;$"!*']*$"#).expect("segment pattern is valid")
});

/// Represents a parsed LSID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LsidIdentifier {
    authority: String,
    namespace: String,
    object: String,
    revision: Option<String>,
}

impl LsidIdentifier {
    /// Parses and validates an LSID string
    ///
    /// The `urn:lsid:` prefix is matched case-insensitively; every other
    /// segment is kept exactly as given.
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let rest = raw
            .get(..PREFIX.len())
            .filter(|head| head.eq_ignore_ascii_case(PREFIX))
            .map(|_| &raw[PREFIX.len()..])
            .ok_or_else(|| ResolutionError::malformed(raw, "missing 'urn:lsid:' prefix"))?;

        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() < 3 {
            return Err(ResolutionError::malformed(
                raw,
                "expected authority, namespace and object",
            ));
        }
        if parts.len() > 4 {
            return Err(ResolutionError::malformed(raw, "too many segments"));
        }

        for (name, part) in ["authority", "namespace", "object", "revision"]
            .iter()
            .zip(&parts)
        {
            if part.is_empty() {
                return Err(ResolutionError::malformed(raw, format!("empty {}", name)));
            }
            if !SEGMENT.is_match(part) {
                return Err(ResolutionError::malformed(
                    raw,
                    format!("invalid character in {}", name),
                ));
            }
        }

        if !is_dns_name(parts[0]) {
            return Err(ResolutionError::malformed(
                raw,
                format!("authority '{}' is not a valid DNS name", parts[0]),
            ));
        }

        Ok(Self {
            authority: parts[0].to_string(),
            namespace: parts[1].to_string(),
            object: parts[2].to_string(),
            revision: parts.get(3).map(|r| r.to_string()),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl fmt::Display for LsidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}:{}",
            PREFIX, self.authority, self.namespace, self.object
        )?;
        if let Some(revision) = &self.revision {
            write!(f, ":{}", revision)?;
        }
        Ok(())
    }
}

impl FromStr for LsidIdentifier {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Checks the RFC 1123 host name rules: dot-separated labels of 1-63
/// alphanumerics or hyphens, no leading/trailing hyphen, 253 bytes overall.
fn is_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsid_parsing() {
        let test_cases = vec![
            (
                "urn:lsid:ipni.org:names:20012728-1",
                ("ipni.org", "names", "20012728-1", None),
            ),
            (
                "urn:lsid:nmbe.ch:spidersp:021946",
                ("nmbe.ch", "spidersp", "021946", None),
            ),
            (
                "urn:lsid:zoobank.org:act:6EA8BB2A-A57B-47C1-953E-042D8CD8E0E2:2",
                (
                    "zoobank.org",
                    "act",
                    "6EA8BB2A-A57B-47C1-953E-042D8CD8E0E2",
                    Some("2"),
                ),
            ),
        ];

        for (input, expected) in test_cases {
            let parsed = LsidIdentifier::parse(input).unwrap();
            assert_eq!(parsed.authority(), expected.0);
            assert_eq!(parsed.namespace(), expected.1);
            assert_eq!(parsed.object(), expected.2);
            assert_eq!(parsed.revision(), expected.3);
        }
    }

    #[test]
    fn test_canonical_round_trip() {
        let canonical = vec![
            "urn:lsid:ipni.org:names:20012728-1",
            "urn:lsid:nmbe.ch:spidersp:021946",
            "urn:lsid:example.com:ns:obj:rev1",
            "urn:lsid:a-b.c0:n_s:o(b)j=1@x;y$z!w*'q,r+s\"t",
        ];

        for input in canonical {
            let parsed = LsidIdentifier::parse(input).unwrap();
            assert_eq!(parsed.to_string(), input);
            assert_eq!(LsidIdentifier::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn test_prefix_is_case_insensitive_and_canonicalised() {
        let parsed: LsidIdentifier = "URN:LSID:ipni.org:names:1".parse().unwrap();
        assert_eq!(parsed.to_string(), "urn:lsid:ipni.org:names:1");
    }

    #[test]
    fn test_invalid_lsid_format() {
        let invalid = vec![
            "",
            "urn:lsrsp:021946",
            "lsid:ipni.org:names:1",
            "urn:lsid:ipni.org::1",
            "urn:lsid:ipni.org:names:",
            "urn:lsid:ipni.org:names",
            "urn:lsid::names:1",
            "urn:lsid:ipni.org:names:1:2:3",
            "urn:lsid:ipni.org:names:1:",
            "urn:lsid:ipni_org:names:1",
            "urn:lsid:-ipni.org:names:1",
            "urn:lsid:ipni..org:names:1",
            "urn:lsid:ipni.org:-names:1",
            "urn:lsid:ipni.org:na mes:1",
            "urn:lsid:ipni.org:names:1/2",
        ];

        for input in invalid {
            assert!(
                matches!(
                    LsidIdentifier::parse(input),
                    Err(ResolutionError::MalformedLsid { .. })
                ),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = LsidIdentifier::parse("urn:lsid:ipni.org:names:20012728-1").unwrap();
        let second = LsidIdentifier::parse("urn:lsid:ipni.org:names:20012728-1").unwrap();
        assert_eq!(first, second);

        let a = LsidIdentifier::parse("urn:lsid:ipni.org::1").unwrap_err().to_string();
        let b = LsidIdentifier::parse("urn:lsid:ipni.org::1").unwrap_err().to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dns_name_rules() {
        assert!(is_dns_name("ipni.org"));
        assert!(is_dns_name("localhost"));
        assert!(is_dns_name("a1-b2.example"));
        assert!(!is_dns_name("bad_label.org"));
        assert!(!is_dns_name("trailing-.org"));
        assert!(!is_dns_name(&"a".repeat(64)));
    }
}

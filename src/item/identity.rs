use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::errors::TriageError;

/// Stable (namespace, object id) pair identifying one digitized item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemIdentity {
    pub namespace: String,
    pub object_id: String,
}

/// Compiled reference patterns, tried in order; the first match wins.
static REFERENCE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static IDENTITY_SPLIT: OnceLock<Option<Regex>> = OnceLock::new();

fn reference_patterns() -> &'static Vec<Regex> {
    REFERENCE_PATTERNS.get_or_init(|| {
        let patterns = [
            // tracker permalink, e.g. https://babel.hathitrust.org/cgi/pt?id=uc1.$b281602
            r"babel\.hathitrust\.org.*id=(.*)",
            // resolver URL, e.g. http://hdl.handle.net/2027/mdp.39015012345678
            r"hdl\.handle\.net/2027/(.*)",
        ];

        patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn identity_split() -> Option<&'static Regex> {
    IDENTITY_SPLIT
        .get_or_init(|| Regex::new(r"(\w{0,4})\.(.*)").ok())
        .as_ref()
}

impl ItemIdentity {
    pub fn new(namespace: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: object_id.into(),
        }
    }

    /// Parse a permalink, a handle URL, or a bare `namespace.id` token.
    pub fn parse(reference: &str) -> Result<Self, TriageError> {
        let reference = reference.trim();

        let candidate = reference_patterns()
            .iter()
            .find_map(|pattern| {
                pattern
                    .captures(reference)
                    .and_then(|captures| captures.get(1))
                    .map(|m| m.as_str())
            })
            .unwrap_or(reference);

        let malformed = || TriageError::MalformedReference {
            reference: reference.to_string(),
        };

        let captures = identity_split()
            .and_then(|split| split.captures(candidate))
            .ok_or_else(malformed)?;

        let namespace = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let object_id = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        if object_id.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(namespace, object_id))
    }

    /// Split a delimited item list (`;` or newline) into identities, preserving order.
    pub fn parse_list(field: &str) -> Result<Vec<Self>, TriageError> {
        field
            .split([';', '\n'])
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.object_id)
    }
}

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Default URN base for named graphs managed by this harvester.
pub const DEFAULT_URN_BASE: &str = "urn:traversal-harvesting:";

/// Percent-encode everything outside the unreserved set, but leave `/` alone
/// so config names stay readable inside the URN.
const GRAPH_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Bidirectional mapping between config names and named-graph URIs under a
/// fixed base.
#[derive(Debug, Clone)]
pub struct GraphNameMapper {
    base: String,
}

impl Default for GraphNameMapper {
    fn default() -> Self {
        Self::new(DEFAULT_URN_BASE)
    }
}

impl GraphNameMapper {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Map a config name to its named-graph URI.
    pub fn key_to_ng(&self, key: &str) -> String {
        format!("{}{}", self.base, utf8_percent_encode(key, GRAPH_NAME_SET))
    }

    /// Recover the config name from a named-graph URI under this base.
    pub fn ng_to_key(&self, ng: &str) -> Option<String> {
        ng.strip_prefix(self.base.as_str())
            .map(|tail| percent_decode_str(tail).decode_utf8_lossy().into_owned())
    }

    /// The admin graph holding `lastmod` records for the remote backend.
    pub fn admin_ng(&self) -> String {
        format!("{}ADMIN", self.base)
    }

    pub fn is_managed(&self, ng: &str) -> bool {
        ng.starts_with(self.base.as_str())
    }
}

use oxigraph::model::NamedNode;
use url::Url;

use crate::nsm::NamespaceManager;
use crate::UriError;

/// Check whether a string is an acceptable absolute URI: a parseable URL with
/// an authority (which covers `localhost` URLs) or an explicit `urn:*`.
/// Bare hostnames have no scheme and are rejected.
pub fn is_uri(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => url.has_host() || url.scheme() == "urn",
        Err(_) => false,
    }
}

/// Resolve a path step or subject string to an IRI.
///
/// Absolute URIs pass through unchanged. A `urn:*` string the validator
/// rejects is retried under the `http://make.safe/` placeholder authority.
/// Anything else is treated as a `prefix:local` CURIE and expanded against
/// the namespace manager.
pub fn resolve_uri(s: &str, nsm: &NamespaceManager) -> Result<NamedNode, UriError> {
    if is_uri(s) {
        return NamedNode::new(s).map_err(|_| UriError::InvalidUri(s.to_string()));
    }
    if let Some(rest) = s.strip_prefix("urn:") {
        let safe = format!("http://make.safe/{rest}");
        if is_uri(&safe) {
            return NamedNode::new(safe).map_err(|_| UriError::InvalidUri(s.to_string()));
        }
    }
    let (prefix, local) = s
        .split_once(':')
        .ok_or_else(|| UriError::InvalidUri(s.to_string()))?;
    let ns = nsm
        .expand(prefix)
        .ok_or_else(|| UriError::UnknownPrefix(prefix.to_string()))?;
    NamedNode::new(format!("{ns}{local}")).map_err(|_| UriError::InvalidUri(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nsm() -> NamespaceManager {
        [("mr", "http://marineregions.org/ns/ontology#")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_is_uri_accepts_absolute_http() {
        assert!(is_uri("http://marineregions.org/mrgid/3293"));
        assert!(is_uri("https://schema.org/geo"));
    }

    #[test]
    fn test_is_uri_accepts_localhost_and_urn() {
        assert!(is_uri("http://localhost:8080/data"));
        assert!(is_uri("urn:traversal-harvesting:test.yml"));
    }

    #[test]
    fn test_is_uri_rejects_bare_hostname_and_curie() {
        assert!(!is_uri("marineregions.org"));
        assert!(!is_uri("mr:isPartOf"));
        assert!(!is_uri(""));
    }

    #[test]
    fn test_resolve_uri_passes_through_absolute() {
        let iri = resolve_uri("https://schema.org/latitude", &nsm()).unwrap();
        assert_eq!(iri.as_str(), "https://schema.org/latitude");
    }

    #[test]
    fn test_resolve_uri_expands_curie() {
        let iri = resolve_uri("mr:isPartOf", &nsm()).unwrap();
        assert_eq!(iri.as_str(), "http://marineregions.org/ns/ontology#isPartOf");
    }

    #[test]
    fn test_resolve_uri_unknown_prefix() {
        assert!(matches!(
            resolve_uri("schema:geo", &nsm()),
            Err(UriError::UnknownPrefix(p)) if p == "schema"
        ));
    }
}

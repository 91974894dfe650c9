use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{Graph, Triple};

use crate::DiscoveryError;

pub const TURTLE: &str = "text/turtle";
pub const JSON_LD: &str = "application/ld+json";
pub const JSON: &str = "application/json";
pub const HTML: &str = "text/html";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Drop media-type parameters: `text/turtle; charset=utf-8` → `text/turtle`.
pub fn strip_parameters(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// The RDF syntax to parse a media type with. Plain `application/json` is
/// treated as JSON-LD.
pub fn rdf_format_for(media_type: &str) -> Option<RdfFormat> {
    match media_type {
        TURTLE => Some(RdfFormat::Turtle),
        JSON_LD | JSON => RdfFormat::from_media_type(JSON_LD),
        _ => None,
    }
}

/// Parse an RDF document body into a graph, resolving relative IRIs against
/// `base_iri`.
pub fn parse_rdf(data: &str, media_type: &str, base_iri: &str) -> Result<Graph, DiscoveryError> {
    let format = rdf_format_for(media_type).ok_or_else(|| DiscoveryError::Parse {
        url: base_iri.to_string(),
        media_type: media_type.to_string(),
        message: "unsupported RDF media type".to_string(),
    })?;
    let parser = RdfParser::from_format(format)
        .with_base_iri(base_iri)
        .map_err(|_| DiscoveryError::InvalidUrl(base_iri.to_string()))?;
    let mut graph = Graph::new();
    for quad in parser.for_reader(data.as_bytes()) {
        let quad = quad.map_err(|e| DiscoveryError::Parse {
            url: base_iri.to_string(),
            media_type: media_type.to_string(),
            message: e.to_string(),
        })?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_parameters() {
        assert_eq!(strip_parameters("text/turtle; charset=utf-8"), "text/turtle");
        assert_eq!(strip_parameters("application/ld+json"), "application/ld+json");
    }

    #[test]
    fn test_rdf_format_for_known_types() {
        assert_eq!(rdf_format_for(TURTLE), Some(RdfFormat::Turtle));
        assert!(rdf_format_for(JSON_LD).is_some());
        assert!(rdf_format_for(JSON).is_some());
        assert_eq!(rdf_format_for(HTML), None);
    }

    #[test]
    fn test_parse_turtle_with_relative_base() {
        let ttl = "@prefix mr: <http://marineregions.org/ns/ontology#> .\n\
                   <3293> mr:isPartOf <63523> .";
        let graph = parse_rdf(ttl, TURTLE, "http://marineregions.org/mrgid/").unwrap();
        assert_eq!(graph.len(), 1);
        let triple = graph.iter().next().unwrap();
        assert_eq!(
            triple.subject.to_string(),
            "<http://marineregions.org/mrgid/3293>"
        );
    }

    #[test]
    fn test_parse_garbage_turtle_fails() {
        assert!(parse_rdf("this is not turtle {", TURTLE, "http://example.org/").is_err());
    }
}

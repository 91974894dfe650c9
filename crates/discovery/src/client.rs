use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use oxigraph::model::Graph;
use tracing::{debug, info, warn};

use crate::formats::{parse_rdf, strip_parameters, HTML, JSON, JSON_LD, OCTET_STREAM, TURTLE};
use crate::html::extract_lod_hints;
use crate::DiscoveryError;

const USER_AGENT: &str = concat!("lodharv/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 8;
const BACKOFF_FACTOR: f64 = 0.4;
const RETRY_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Something that can produce the RDF description of a resource. Lets the
/// traversal engine run against canned descriptions in tests.
pub trait DescriptionSource {
    fn get_graph_for_format(
        &self,
        url: &str,
        accept_types: &[&str],
    ) -> Result<Option<Graph>, DiscoveryError>;
}

/// HTTP client that dereferences a subject URL into an RDF graph: direct
/// content negotiation first, then HTML signposting and embedded RDF as a
/// fallback.
pub struct LodClient {
    agent: ureq::Agent,
    accept_types: Vec<String>,
}

impl Default for LodClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LodClient {
    /// Client with the default harvest accept policy (Turtle first).
    pub fn new() -> Self {
        Self::with_accept_types(&[TURTLE])
    }

    /// Client with an explicit accept-type preference order.
    pub fn with_accept_types(accept_types: &[&str]) -> Self {
        Self {
            agent: ureq::agent(),
            accept_types: accept_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// The configured accept policy, usable as the `accept_types` argument.
    pub fn accept_types(&self) -> Vec<&str> {
        self.accept_types.iter().map(String::as_str).collect()
    }

    fn descend(
        &self,
        url: &str,
        accept_types: &[&str],
        visited: &mut HashSet<String>,
    ) -> Result<Option<Graph>, DiscoveryError> {
        if !visited.insert(url.to_string()) {
            debug!(url, "already visited in this harvest, skipping");
            return Ok(None);
        }

        for &accept in accept_types {
            let response = match self.request(url, accept) {
                Ok(response) => response,
                Err(e) => {
                    warn!(url, accept, error = %e, "request failed");
                    continue;
                }
            };
            let content_type = strip_parameters(response.content_type()).to_string();
            let negotiated_turtle = accept == TURTLE;
            let media_type = match content_type.as_str() {
                TURTLE | JSON_LD | JSON => Some(content_type.clone()),
                OCTET_STREAM if negotiated_turtle => Some(TURTLE.to_string()),
                _ => None,
            };
            let Some(media_type) = media_type else {
                debug!(url, content_type = content_type.as_str(), "response is not directly parseable RDF");
                continue;
            };
            let body = response.into_string().map_err(|e| DiscoveryError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            match parse_rdf(&body, &media_type, url) {
                Ok(graph) => {
                    info!(url, media_type = media_type.as_str(), triples = graph.len(), "parsed description");
                    return Ok(Some(graph));
                }
                Err(e) => {
                    warn!(url, media_type = media_type.as_str(), error = %e, "failed to parse response body");
                }
            }
        }

        self.descend_html(url, accept_types, visited)
    }

    /// Last-resort pass: fetch the page as HTML and chase signposting links
    /// and embedded RDF scripts.
    fn descend_html(
        &self,
        url: &str,
        accept_types: &[&str],
        visited: &mut HashSet<String>,
    ) -> Result<Option<Graph>, DiscoveryError> {
        let response = match self.request(url, HTML) {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "HTML fallback request failed");
                return Ok(None);
            }
        };
        if strip_parameters(response.content_type()) != HTML {
            return Ok(None);
        }
        let body = response.into_string().map_err(|e| DiscoveryError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let hints = extract_lod_hints(&body, url);
        info!(url, links = hints.links.len(), "found signposting links");

        let mut combined = Graph::new();
        for link in &hints.links {
            match self.descend(link, accept_types, visited) {
                Ok(Some(graph)) => {
                    for triple in graph.iter() {
                        combined.insert(triple);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(link = link.as_str(), error = %e, "signposting link harvest failed"),
            }
        }
        for (media_type, script_body) in &hints.scripts {
            match parse_rdf(script_body, media_type, url) {
                Ok(graph) => {
                    for triple in graph.iter() {
                        combined.insert(triple);
                    }
                }
                Err(e) => {
                    warn!(url, media_type = media_type.as_str(), error = %e, "embedded script did not parse")
                }
            }
        }
        if combined.is_empty() {
            Ok(None)
        } else {
            Ok(Some(combined))
        }
    }

    /// GET with one accept type, retrying retryable statuses with
    /// exponential backoff (`0.4 · 2^(n−1)` s, at most 8 attempts).
    fn request(&self, url: &str, accept: &str) -> Result<ureq::Response, DiscoveryError> {
        let mut attempt = 1;
        loop {
            let result = self
                .agent
                .get(url)
                .set("Accept", accept)
                .set("User-Agent", USER_AGENT)
                .call();
            match result {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(code, _))
                    if RETRY_STATUS.contains(&code) && attempt < MAX_ATTEMPTS =>
                {
                    let delay = BACKOFF_FACTOR * 2f64.powi(attempt as i32 - 1);
                    debug!(url, code, attempt, delay, "retrying");
                    thread::sleep(Duration::from_secs_f64(delay));
                    attempt += 1;
                }
                Err(ureq::Error::Status(code, _)) => {
                    return Err(DiscoveryError::Transport {
                        url: url.to_string(),
                        message: format!("status {code} after {attempt} attempt(s)"),
                    })
                }
                Err(e) => {
                    return Err(DiscoveryError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

impl DescriptionSource for LodClient {
    /// Obtain an RDF description of `url`, trying each accept type in order
    /// and falling back to HTML signposting. Returns `Ok(None)` when nothing
    /// machine-readable could be found; transport failures degrade to the
    /// same outcome and are logged.
    fn get_graph_for_format(
        &self,
        url: &str,
        accept_types: &[&str],
    ) -> Result<Option<Graph>, DiscoveryError> {
        if url::Url::parse(url).is_err() {
            return Err(DiscoveryError::InvalidUrl(url.to_string()));
        }
        let mut visited = HashSet::new();
        self.descend(url, accept_types, &mut visited)
    }
}

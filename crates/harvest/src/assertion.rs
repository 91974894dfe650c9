use oxigraph::model::NamedNode;
use tracing::{debug, warn};
use uuid::Uuid;

use discovery::formats::TURTLE;
use discovery::DescriptionSource;
use graphstore::{term_value, StoreAccess};
use urikit::{is_uri, NamespaceManager};

use crate::config::AssertPath;
use crate::error::HarvestError;
use crate::report::{AssertionRecord, GraphAdditionRecord};

/// Asserts one property path for one subject against the store, harvesting
/// descriptions of unresolved endpoints until the path holds or the bounce
/// bound is exhausted.
///
/// `depth` counts the steps trimmed from the end of the path, so the walk
/// tries the longest prefix first. A successful verify "bounces": the walk
/// harvests the endpoint of the verified prefix and restarts at the full
/// path. `previous_bounce_depth` remembers the verified length of the last
/// bounce; since the next successful verify must be strictly longer, the
/// walk terminates even on cyclic data.
pub struct PathAssertion<'a, S: DescriptionSource> {
    subject: NamedNode,
    path: &'a AssertPath,
    store: &'a StoreAccess,
    source: &'a S,
    nsm: &'a NamespaceManager,
    config_name: &'a str,
    accept_types: Vec<String>,
    depth: usize,
    previous_bounce_depth: usize,
    bounced: bool,
    verified_depth: usize,
    graphs_added: Vec<GraphAdditionRecord>,
}

impl<'a, S: DescriptionSource> PathAssertion<'a, S> {
    /// Returns `None` (and emits no record) when the subject is not an
    /// acceptable IRI.
    pub fn new(
        subject: &str,
        path: &'a AssertPath,
        store: &'a StoreAccess,
        source: &'a S,
        nsm: &'a NamespaceManager,
        config_name: &'a str,
    ) -> Option<Self> {
        if !is_uri(subject) {
            warn!(subject, "subject is not a valid IRI, skipping");
            return None;
        }
        let subject = match NamedNode::new(subject) {
            Ok(node) => node,
            Err(_) => {
                warn!(subject, "subject is not a valid IRI, skipping");
                return None;
            }
        };
        Some(Self {
            subject,
            path,
            store,
            source,
            nsm,
            config_name,
            accept_types: vec![TURTLE.to_string()],
            depth: 0,
            previous_bounce_depth: 0,
            bounced: false,
            verified_depth: 0,
            graphs_added: Vec::new(),
        })
    }

    /// Override the accept policy used for harvests (Turtle-first default).
    pub fn with_accept_types(mut self, accept_types: &[&str]) -> Self {
        self.accept_types = accept_types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Drive the walk to completion and produce the assertion record.
    pub fn run(mut self) -> Result<AssertionRecord, HarvestError> {
        let n = self.path.max_size();
        debug!(subject = self.subject.as_str(), path = %self.path, "asserting path");

        while self.depth <= n {
            if self.bounced && self.depth >= n - self.previous_bounce_depth {
                break;
            }
            if self.depth == n {
                // every prefix failed: fetch the subject's own description
                // and retry the full path once
                let subject_uri = self.subject.as_str().to_string();
                self.harvest(&subject_uri)?;
                self.previous_bounce_depth = n;
                self.depth = 0;
                self.bounced = true;
            }

            let len = n - self.depth;
            debug!(depth = self.depth, len, "verifying prefix");
            if self
                .store
                .verify_path(&self.subject, self.path.sub_path(len), self.nsm)?
            {
                self.verified_depth = self.verified_depth.max(len);
                if len < n {
                    self.harvest_endpoint(len)?;
                }
                self.previous_bounce_depth = len;
                self.depth = 0;
                self.bounced = true;
                continue;
            }
            self.depth += 1;
        }

        let result = self.verified_depth == n;
        let reported_path = self.path.text_for_depth(n - self.depth.min(n));
        let message = if result {
            "Assertion successful".to_string()
        } else {
            format!("Assertion failed, last path: {reported_path}")
        };
        Ok(AssertionRecord {
            id: Uuid::new_v4(),
            subject: self.subject.as_str().to_string(),
            path_text: reported_path,
            depth_succeeded: self.verified_depth,
            result,
            timestamp: chrono::Utc::now(),
            message,
            graphs_added: self.graphs_added,
        })
    }

    /// Dereference the object at the end of the verified prefix, when it is
    /// an IRI.
    fn harvest_endpoint(&mut self, len: usize) -> Result<(), HarvestError> {
        let endpoint =
            self.store
                .select_path_endpoint(&self.subject, self.path.sub_path(len), self.nsm)?;
        let Some(endpoint) = endpoint else {
            return Ok(());
        };
        if !endpoint.starts_with('<') {
            debug!(
                endpoint = endpoint.as_str(),
                "prefix endpoint is not an IRI, nothing to harvest"
            );
            return Ok(());
        }
        let uri = term_value(&endpoint);
        self.harvest(&uri)
    }

    /// Fetch a description and insert it under the config's named graph.
    /// Fetch failures degrade to an empty harvest; insert failures are fatal
    /// for the task.
    fn harvest(&mut self, uri: &str) -> Result<(), HarvestError> {
        debug!(uri, "harvesting");
        let graph = match self.source.get_graph_for_format(uri, &self.accepts()) {
            Ok(Some(graph)) if !graph.is_empty() => graph,
            Ok(_) => {
                debug!(uri, "no description harvested");
                return Ok(());
            }
            Err(e) => {
                warn!(uri, error = %e, "harvest failed, continuing without it");
                return Ok(());
            }
        };
        self.store.insert_for_config(&graph, self.config_name)?;
        self.graphs_added.push(GraphAdditionRecord::new(
            uri,
            self.accept_types.first().map(String::as_str).unwrap_or(TURTLE),
            graph.len(),
        ));
        Ok(())
    }

    fn accepts(&self) -> Vec<&str> {
        self.accept_types.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery::DiscoveryError;
    use graphstore::StoreBackend;
    use oxigraph::model::{Graph, Literal, Triple};
    use std::cell::RefCell;
    use std::collections::HashMap;

    const MRGID_3293: &str = "http://marineregions.org/mrgid/3293";
    const MRGID_63523: &str = "http://marineregions.org/mrgid/63523";
    const GEO_1: &str = "http://marineregions.org/geo/1";
    const IS_PART_OF: &str = "http://marineregions.org/ns/ontology#isPartOf";
    const GEO: &str = "https://schema.org/geo";
    const LATITUDE: &str = "https://schema.org/latitude";

    /// Serves canned descriptions and records which URLs were requested.
    struct StubSource {
        descriptions: HashMap<String, Graph>,
        requested: RefCell<Vec<String>>,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                descriptions: HashMap::new(),
                requested: RefCell::new(Vec::new()),
            }
        }

        fn with(mut self, url: &str, graph: Graph) -> Self {
            self.descriptions.insert(url.to_string(), graph);
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.borrow().clone()
        }
    }

    impl DescriptionSource for StubSource {
        fn get_graph_for_format(
            &self,
            url: &str,
            _accept_types: &[&str],
        ) -> Result<Option<Graph>, DiscoveryError> {
            self.requested.borrow_mut().push(url.to_string());
            Ok(self.descriptions.get(url).cloned())
        }
    }

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(node(s), node(p), node(o))
    }

    fn graph_of(triples: &[Triple]) -> Graph {
        let mut graph = Graph::new();
        for t in triples {
            graph.insert(t);
        }
        graph
    }

    fn nsm() -> NamespaceManager {
        [("mr", "http://marineregions.org/ns/ontology#")]
            .into_iter()
            .collect()
    }

    fn path(nsm: &NamespaceManager) -> AssertPath {
        AssertPath::resolve(
            "mr:isPartOf/<https://schema.org/geo>/<https://schema.org/latitude>",
            nsm,
        )
        .unwrap()
    }

    fn seeded_store() -> StoreAccess {
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        store
            .insert_for_config(
                &graph_of(&[triple(MRGID_3293, IS_PART_OF, MRGID_63523)]),
                "base_test.yml",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_resolves_through_two_bounces() {
        let nsm = nsm();
        let path = path(&nsm);
        let store = seeded_store();
        let source = StubSource::new()
            .with(MRGID_63523, graph_of(&[triple(MRGID_63523, GEO, GEO_1)]))
            .with(
                GEO_1,
                graph_of(&[Triple::new(
                    node(GEO_1),
                    node(LATITUDE),
                    Literal::new_simple_literal("51.1"),
                )]),
            );

        let record = PathAssertion::new(MRGID_3293, &path, &store, &source, &nsm, "base_test.yml")
            .unwrap()
            .run()
            .unwrap();

        assert!(record.result);
        assert_eq!(record.depth_succeeded, 3);
        assert_eq!(record.message, "Assertion successful");
        assert_eq!(record.graphs_added.len(), 2);
        assert_eq!(record.graphs_added[0].url, MRGID_63523);
        assert_eq!(record.graphs_added[1].url, GEO_1);
        assert_eq!(source.requested(), vec![MRGID_63523, GEO_1]);
    }

    #[test]
    fn test_unresolvable_path_harvests_subject_once_and_fails() {
        let nsm = nsm();
        let two_steps = AssertPath::resolve("<http://example.org/a>/<http://example.org/b>", &nsm)
            .unwrap();
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let source = StubSource::new();

        let subject = "http://example.org/subject";
        let record = PathAssertion::new(subject, &two_steps, &store, &source, &nsm, "x.yml")
            .unwrap()
            .run()
            .unwrap();

        assert!(!record.result);
        assert_eq!(record.depth_succeeded, 0);
        assert!(record.graphs_added.is_empty());
        assert!(record.message.starts_with("Assertion failed"));
        // only the subject itself was dereferenced, exactly once
        assert_eq!(source.requested(), vec![subject]);
    }

    #[test]
    fn test_already_complete_store_succeeds_without_harvesting() {
        let nsm = nsm();
        let path = path(&nsm);
        let store = seeded_store();
        store
            .insert_for_config(
                &graph_of(&[
                    triple(MRGID_63523, GEO, GEO_1),
                    Triple::new(node(GEO_1), node(LATITUDE), Literal::new_simple_literal("51.1")),
                ]),
                "base_test.yml",
            )
            .unwrap();
        let source = StubSource::new();

        let record = PathAssertion::new(MRGID_3293, &path, &store, &source, &nsm, "base_test.yml")
            .unwrap()
            .run()
            .unwrap();

        assert!(record.result);
        assert!(record.graphs_added.is_empty());
        assert!(source.requested().is_empty());
    }

    #[test]
    fn test_terminates_when_harvests_stop_adding_depth() {
        let nsm = nsm();
        let path = path(&nsm);
        let store = seeded_store();
        // the partial endpoint dereferences to a description that never
        // mentions the rest of the chain
        let source = StubSource::new().with(
            MRGID_63523,
            graph_of(&[triple(
                MRGID_63523,
                "https://schema.org/name",
                "http://example.org/ignored",
            )]),
        );

        let record = PathAssertion::new(MRGID_3293, &path, &store, &source, &nsm, "base_test.yml")
            .unwrap()
            .run()
            .unwrap();

        assert!(!record.result);
        assert_eq!(record.depth_succeeded, 1);
        assert_eq!(record.graphs_added.len(), 1);
        // the failed walk reports the deepest prefix still unresolved
        assert_eq!(record.path_text, format!("<{IS_PART_OF}>"));
    }

    #[test]
    fn test_invalid_subject_emits_no_assertion() {
        let nsm = nsm();
        let path = path(&nsm);
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let source = StubSource::new();
        assert!(PathAssertion::new(
            "not a subject",
            &path,
            &store,
            &source,
            &nsm,
            "base_test.yml"
        )
        .is_none());
    }
}

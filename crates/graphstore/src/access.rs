use chrono::{DateTime, Utc};
use oxigraph::model::{Graph, NamedNode};
use tracing::{debug, warn};
use urikit::{inject_prefixes, NamespaceManager};

use crate::backend::StoreBackend;
use crate::error::StoreError;
use crate::mapper::GraphNameMapper;
use crate::{term_value, Row};

/// Facade over a pluggable triple store: SELECT access, property-trajectory
/// verification, named-graph inserts with freshness tracking, and the
/// config-name convenience layer on top of the graph-name mapper.
pub struct StoreAccess {
    backend: StoreBackend,
    mapper: GraphNameMapper,
}

impl StoreAccess {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            mapper: GraphNameMapper::default(),
        }
    }

    pub fn with_mapper(backend: StoreBackend, mapper: GraphNameMapper) -> Self {
        Self { backend, mapper }
    }

    pub fn mapper(&self) -> &GraphNameMapper {
        &self.mapper
    }

    pub fn select(&self, sparql: &str) -> Result<Vec<Row>, StoreError> {
        self.backend.select(sparql)
    }

    /// Project the first column of a SELECT into a list of subject IRIs.
    /// Literal and blank-node rows are dropped.
    pub fn select_subjects(&self, sparql: &str) -> Result<Vec<String>, StoreError> {
        let rows = self.backend.select(sparql)?;
        let subjects: Vec<String> = rows
            .iter()
            .filter_map(|row| row.first())
            .filter(|(_, term)| term.starts_with('<'))
            .map(|(_, term)| term_value(term))
            .collect();
        debug!(count = subjects.len(), "selected subjects");
        Ok(subjects)
    }

    /// True iff `subject step1 / … / stepN ?o` has at least one binding.
    pub fn verify_path(
        &self,
        subject: &NamedNode,
        path: &[NamedNode],
        nsm: &NamespaceManager,
    ) -> Result<bool, StoreError> {
        let sparql = trajectory_query(subject, path, nsm);
        Ok(!self.backend.select(&sparql)?.is_empty())
    }

    /// First object bound at the end of the trajectory, N-Triples-encoded,
    /// if any.
    pub fn select_path_endpoint(
        &self,
        subject: &NamedNode,
        path: &[NamedNode],
        nsm: &NamespaceManager,
    ) -> Result<Option<String>, StoreError> {
        let sparql = trajectory_query(subject, path, nsm);
        let rows = self.backend.select(&sparql)?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .map(|(_, term)| term.clone()))
    }

    pub fn insert(&self, graph: &Graph, named_graph: &str) -> Result<(), StoreError> {
        let ng = NamedNode::new(named_graph)
            .map_err(|_| StoreError::InvalidGraphName(named_graph.to_string()))?;
        self.backend.insert(graph, &ng)
    }

    /// Insert the triples into the named graph tied to this config name.
    pub fn insert_for_config(&self, graph: &Graph, config_name: &str) -> Result<(), StoreError> {
        if graph.is_empty() {
            warn!(config_name, "graph is empty, nothing to insert");
            return Ok(());
        }
        self.insert(graph, &self.mapper.key_to_ng(config_name))
    }

    pub fn lastmod_ts(&self, named_graph: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.backend.lastmod_ts(named_graph)
    }

    pub fn lastmod_ts_for_config(
        &self,
        config_name: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.lastmod_ts(&self.mapper.key_to_ng(config_name))
    }

    /// True iff the graph's content is at most `age_minutes` old. A graph
    /// without a lastmod record is considered aged out.
    pub fn verify_max_age(&self, named_graph: &str, age_minutes: u64) -> Result<bool, StoreError> {
        match self.lastmod_ts(named_graph)? {
            None => Ok(false),
            Some(lastmod) => {
                let age = Utc::now().signed_duration_since(lastmod);
                Ok(age.num_seconds() <= age_minutes as i64 * 60)
            }
        }
    }

    pub fn verify_max_age_of_config(
        &self,
        config_name: &str,
        age_minutes: u64,
    ) -> Result<bool, StoreError> {
        self.verify_max_age(&self.mapper.key_to_ng(config_name), age_minutes)
    }

    pub fn drop_graph(&self, named_graph: &str) -> Result<(), StoreError> {
        let ng = NamedNode::new(named_graph)
            .map_err(|_| StoreError::InvalidGraphName(named_graph.to_string()))?;
        self.backend.drop_graph(&ng)
    }

    pub fn drop_graph_for_config(&self, config_name: &str) -> Result<(), StoreError> {
        self.drop_graph(&self.mapper.key_to_ng(config_name))
    }

    pub fn forget_graph(&self, named_graph: &str) -> Result<(), StoreError> {
        let ng = NamedNode::new(named_graph)
            .map_err(|_| StoreError::InvalidGraphName(named_graph.to_string()))?;
        self.backend.forget_graph(&ng)
    }

    pub fn forget_graph_for_config(&self, config_name: &str) -> Result<(), StoreError> {
        self.forget_graph(&self.mapper.key_to_ng(config_name))
    }

    /// Named graphs managed under the configured base.
    pub fn named_graphs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .backend
            .named_graphs()?
            .into_iter()
            .filter(|ng| self.mapper.is_managed(ng))
            .collect())
    }

    /// Config names recoverable from the managed named graphs.
    pub fn name_configs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .named_graphs()?
            .iter()
            .filter_map(|ng| self.mapper.ng_to_key(ng))
            .collect())
    }

    pub fn all_triples(&self) -> Result<Vec<Row>, StoreError> {
        self.select("SELECT ?s ?p ?o WHERE { ?s ?p ?o }")
    }
}

/// The trajectory query template: one row per object reachable over the full
/// chain of steps from the subject.
fn trajectory_query(subject: &NamedNode, path: &[NamedNode], nsm: &NamespaceManager) -> String {
    let trajectory = path
        .iter()
        .map(|step| format!("<{}>", step.as_str()))
        .collect::<Vec<_>>()
        .join(" / ");
    inject_prefixes(
        &format!(
            "SELECT ?o WHERE {{ <{}> {} ?o . }}",
            subject.as_str(),
            trajectory
        ),
        nsm,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{Literal, Triple};

    fn nsm() -> NamespaceManager {
        [("mr", "http://marineregions.org/ns/ontology#")]
            .into_iter()
            .collect()
    }

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    fn seeded_access() -> StoreAccess {
        let access = StoreAccess::new(StoreBackend::memory().unwrap());
        let mut graph = Graph::new();
        graph.insert(&Triple::new(
            node("http://marineregions.org/mrgid/3293"),
            node("http://marineregions.org/ns/ontology#isPartOf"),
            node("http://marineregions.org/mrgid/63523"),
        ));
        graph.insert(&Triple::new(
            node("http://marineregions.org/mrgid/63523"),
            node("https://schema.org/name"),
            Literal::new_simple_literal("Belgian Exclusive Economic Zone"),
        ));
        access.insert_for_config(&graph, "base_test.yml").unwrap();
        access
    }

    #[test]
    fn test_insert_sets_lastmod() {
        let access = seeded_access();
        assert!(access
            .lastmod_ts_for_config("base_test.yml")
            .unwrap()
            .is_some());
        assert!(access.lastmod_ts_for_config("other.yml").unwrap().is_none());
    }

    #[test]
    fn test_insert_empty_graph_is_a_noop() {
        let access = StoreAccess::new(StoreBackend::memory().unwrap());
        access.insert_for_config(&Graph::new(), "base_test.yml").unwrap();
        assert!(access
            .lastmod_ts_for_config("base_test.yml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_verify_path_present_and_absent() {
        let access = seeded_access();
        let subject = node("http://marineregions.org/mrgid/3293");
        let one_step = [node("http://marineregions.org/ns/ontology#isPartOf")];
        let two_steps = [
            node("http://marineregions.org/ns/ontology#isPartOf"),
            node("https://schema.org/name"),
        ];
        let missing = [node("https://schema.org/geo")];
        assert!(access.verify_path(&subject, &one_step, &nsm()).unwrap());
        assert!(access.verify_path(&subject, &two_steps, &nsm()).unwrap());
        assert!(!access.verify_path(&subject, &missing, &nsm()).unwrap());
    }

    #[test]
    fn test_select_path_endpoint_returns_first_object() {
        let access = seeded_access();
        let subject = node("http://marineregions.org/mrgid/3293");
        let one_step = [node("http://marineregions.org/ns/ontology#isPartOf")];
        assert_eq!(
            access
                .select_path_endpoint(&subject, &one_step, &nsm())
                .unwrap(),
            Some("<http://marineregions.org/mrgid/63523>".to_string())
        );
        let missing = [node("https://schema.org/geo")];
        assert_eq!(
            access
                .select_path_endpoint(&subject, &missing, &nsm())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_select_subjects_keeps_iri_rows_only() {
        let access = seeded_access();
        let subjects = access
            .select_subjects("SELECT ?o WHERE { ?s <https://schema.org/name> ?o }")
            .unwrap();
        assert!(subjects.is_empty());
        let subjects = access
            .select_subjects(
                "SELECT ?o WHERE { ?s <http://marineregions.org/ns/ontology#isPartOf> ?o }",
            )
            .unwrap();
        assert_eq!(subjects, vec!["http://marineregions.org/mrgid/63523"]);
    }

    #[test]
    fn test_named_graph_isolation() {
        let access = seeded_access();
        let mut other = Graph::new();
        other.insert(&Triple::new(
            node("http://example.org/a"),
            node("http://example.org/p"),
            node("http://example.org/b"),
        ));
        access.insert_for_config(&other, "other.yml").unwrap();

        let graphs = access.named_graphs().unwrap();
        assert!(graphs.contains(&"urn:traversal-harvesting:base_test.yml".to_string()));
        assert!(graphs.contains(&"urn:traversal-harvesting:other.yml".to_string()));

        // both configs are queryable through the combined view, yet each
        // keeps its own freshness record
        let first = access.lastmod_ts_for_config("base_test.yml").unwrap().unwrap();
        let second = access.lastmod_ts_for_config("other.yml").unwrap().unwrap();
        assert!(second >= first);
        let mut names = access.name_configs().unwrap();
        names.sort();
        assert_eq!(names, vec!["base_test.yml", "other.yml"]);
    }

    #[test]
    fn test_verify_max_age() {
        let access = seeded_access();
        assert!(access
            .verify_max_age_of_config("base_test.yml", 5)
            .unwrap());
        assert!(!access.verify_max_age_of_config("never.yml", 5).unwrap());
    }

    #[test]
    fn test_drop_graph_removes_both_copies() {
        let access = seeded_access();
        access.drop_graph_for_config("base_test.yml").unwrap();
        let subject = node("http://marineregions.org/mrgid/3293");
        let one_step = [node("http://marineregions.org/ns/ontology#isPartOf")];
        assert!(!access.verify_path(&subject, &one_step, &nsm()).unwrap());
        assert!(access.all_triples().unwrap().is_empty());
    }

    #[test]
    fn test_drop_graph_keeps_triples_shared_with_other_configs() {
        let access = StoreAccess::new(StoreBackend::memory().unwrap());
        let mut shared = Graph::new();
        shared.insert(&Triple::new(
            node("http://marineregions.org/mrgid/3293"),
            node("http://marineregions.org/ns/ontology#isPartOf"),
            node("http://marineregions.org/mrgid/63523"),
        ));
        access.insert_for_config(&shared, "first.yml").unwrap();
        access.insert_for_config(&shared, "second.yml").unwrap();

        // dropping one config leaves the triple queryable for the other
        access.drop_graph_for_config("first.yml").unwrap();
        let subject = node("http://marineregions.org/mrgid/3293");
        let one_step = [node("http://marineregions.org/ns/ontology#isPartOf")];
        assert!(access.verify_path(&subject, &one_step, &nsm()).unwrap());

        // dropping the last holder removes it from the combined view too
        access.drop_graph_for_config("second.yml").unwrap();
        assert!(!access.verify_path(&subject, &one_step, &nsm()).unwrap());
        assert!(access.all_triples().unwrap().is_empty());
    }
}

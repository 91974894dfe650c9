use tracing::{debug, error, info};

use discovery::DescriptionSource;
use graphstore::StoreAccess;

use crate::assertion::PathAssertion;
use crate::config::{Config, Task};
use crate::error::HarvestError;
use crate::report::{ExecutionReport, TaskReport};

/// Drives every task of one config: subjects × paths through the assertion
/// engine, collecting the execution report and writing it back to the
/// config's named graph.
pub struct Executor<'a, S: DescriptionSource> {
    config: &'a Config,
    store: &'a StoreAccess,
    source: &'a S,
}

impl<'a, S: DescriptionSource> Executor<'a, S> {
    pub fn new(config: &'a Config, store: &'a StoreAccess, source: &'a S) -> Self {
        Self {
            config,
            store,
            source,
        }
    }

    pub fn run(&self) -> Result<ExecutionReport, HarvestError> {
        info!(
            config = self.config.name.as_str(),
            tasks = self.config.tasks.len(),
            "executing"
        );
        let mut report = ExecutionReport::new(&self.config.name);
        for task in &self.config.tasks {
            report.tasks.push(self.run_task(task));
        }

        // the report itself becomes part of the harvested graph, but only
        // when something was actually asserted
        if report.has_assertions() {
            let graph = report.to_graph()?;
            self.store.insert_for_config(&graph, &self.config.name)?;
        } else {
            debug!(
                config = self.config.name.as_str(),
                "no assertions, no report rendered"
            );
        }
        Ok(report)
    }

    /// A fatal error inside a task ends that task; the partial report
    /// stands and later tasks still run.
    fn run_task(&self, task: &Task) -> TaskReport {
        let mut task_report = TaskReport::new();
        let subjects = match task.subjects.list_subjects(self.store) {
            Ok(subjects) => subjects,
            Err(e) => {
                error!(config = self.config.name.as_str(), error = %e, "could not list task subjects");
                return task_report;
            }
        };
        debug!(
            config = self.config.name.as_str(),
            subjects = subjects.len(),
            paths = task.paths.len(),
            "running task"
        );
        for subject in &subjects {
            for path in &task.paths {
                let Some(assertion) = PathAssertion::new(
                    subject,
                    path,
                    self.store,
                    self.source,
                    &self.config.nsm,
                    &self.config.name,
                ) else {
                    // invalid subject: skip it entirely, including its
                    // remaining paths
                    break;
                };
                match assertion.run() {
                    Ok(record) => task_report.assertions.push(record),
                    Err(e) => {
                        error!(
                            config = self.config.name.as_str(),
                            subject = subject.as_str(),
                            path = %path,
                            error = %e,
                            "assertion failed fatally, aborting task"
                        );
                        return task_report;
                    }
                }
            }
        }
        task_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssertPath, SubjectDefinition};
    use discovery::DiscoveryError;
    use graphstore::StoreBackend;
    use oxigraph::model::{Graph, NamedNode, Triple};
    use urikit::NamespaceManager;

    struct EmptySource;

    impl DescriptionSource for EmptySource {
        fn get_graph_for_format(
            &self,
            _url: &str,
            _accept_types: &[&str],
        ) -> Result<Option<Graph>, DiscoveryError> {
            Ok(None)
        }
    }

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    fn config_with_subjects(subjects: SubjectDefinition) -> Config {
        let nsm: NamespaceManager = [("ex", "http://example.org/")].into_iter().collect();
        let paths = vec![AssertPath::resolve("ex:p", &nsm).unwrap()];
        Config {
            name: "exec_test.yml".to_string(),
            nsm,
            tasks: vec![Task { subjects, paths }],
        }
    }

    #[test]
    fn test_report_written_to_config_graph() {
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let mut graph = Graph::new();
        graph.insert(&Triple::new(
            node("http://example.org/a"),
            node("http://example.org/p"),
            node("http://example.org/b"),
        ));
        store.insert_for_config(&graph, "exec_test.yml").unwrap();
        let before = store.lastmod_ts_for_config("exec_test.yml").unwrap().unwrap();

        let config = config_with_subjects(SubjectDefinition::Literal(vec![
            "http://example.org/a".to_string(),
        ]));
        let source = EmptySource;
        let report = Executor::new(&config, &store, &source).run().unwrap();

        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.tasks[0].assertions.len(), 1);
        assert!(report.tasks[0].assertions[0].result);
        // the rendered report advanced the graph's lastmod
        let after = store.lastmod_ts_for_config("exec_test.yml").unwrap().unwrap();
        assert!(after >= before);
        let rows = store
            .select(
                "SELECT ?r WHERE { ?r <https://w3id.org/traversal-harvesting/ns#configName> ?n }",
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_empty_subject_list_renders_no_report() {
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let config = config_with_subjects(SubjectDefinition::Literal(Vec::new()));
        let source = EmptySource;
        let report = Executor::new(&config, &store, &source).run().unwrap();
        assert!(!report.has_assertions());
        assert!(store
            .lastmod_ts_for_config("exec_test.yml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sparql_subjects_filter_non_iri_rows() {
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let mut graph = Graph::new();
        graph.insert(&Triple::new(
            node("http://example.org/a"),
            node("http://example.org/p"),
            node("http://example.org/b"),
        ));
        graph.insert(&Triple::new(
            node("http://example.org/c"),
            node("http://example.org/p"),
            oxigraph::model::Literal::new_simple_literal("just text"),
        ));
        store.insert_for_config(&graph, "exec_test.yml").unwrap();

        let config = config_with_subjects(SubjectDefinition::Sparql(
            "SELECT ?subject WHERE { ?s <http://example.org/p> ?subject }".to_string(),
        ));
        let source = EmptySource;
        let report = Executor::new(&config, &store, &source).run().unwrap();
        // only the IRI binding becomes a subject
        assert_eq!(report.tasks[0].assertions.len(), 1);
        assert_eq!(
            report.tasks[0].assertions[0].subject,
            "http://example.org/b"
        );
    }

    #[test]
    fn test_invalid_subject_skipped_valid_ones_run() {
        let store = StoreAccess::new(StoreBackend::memory().unwrap());
        let config = config_with_subjects(SubjectDefinition::Literal(vec![
            "definitely not an iri".to_string(),
            "http://example.org/a".to_string(),
        ]));
        let source = EmptySource;
        let report = Executor::new(&config, &store, &source).run().unwrap();
        assert_eq!(report.tasks[0].assertions.len(), 1);
        assert_eq!(report.tasks[0].assertions[0].subject, "http://example.org/a");
    }
}

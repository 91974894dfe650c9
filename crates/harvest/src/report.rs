use chrono::{DateTime, SecondsFormat, Utc};
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Graph, Literal, NamedNode, Triple};
use uuid::Uuid;

use crate::error::HarvestError;

/// Project vocabulary for execution reporting.
const THARV: &str = "https://w3id.org/traversal-harvesting/ns#";
const SCHEMA: &str = "https://schema.org/";
const VOID_TRIPLES: &str = "http://rdfs.org/ns/void#triples";
const DCT_MODIFIED: &str = "http://purl.org/dc/terms/modified";

/// One document that contributed triples to the store during an assertion.
#[derive(Debug, Clone)]
pub struct GraphAdditionRecord {
    pub id: Uuid,
    pub url: String,
    pub mime_type: String,
    pub triple_count: usize,
}

impl GraphAdditionRecord {
    pub fn new(url: &str, mime_type: &str, triple_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            mime_type: mime_type.to_string(),
            triple_count,
        }
    }
}

/// The outcome of asserting one `(subject, path)` pair.
#[derive(Debug, Clone)]
pub struct AssertionRecord {
    pub id: Uuid,
    pub subject: String,
    pub path_text: String,
    pub depth_succeeded: usize,
    pub result: bool,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub graphs_added: Vec<GraphAdditionRecord>,
}

/// Per-task aggregation of assertion records.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: Uuid,
    pub last_mod: DateTime<Utc>,
    pub assertions: Vec<AssertionRecord>,
}

impl TaskReport {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            last_mod: Utc::now(),
            assertions: Vec::new(),
        }
    }
}

impl Default for TaskReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-config execution report, rendered to RDF once any assertion exists.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub id: Uuid,
    pub config_name: String,
    pub last_mod: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
}

impl ExecutionReport {
    pub fn new(config_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_name: config_name.to_string(),
            last_mod: Utc::now(),
            tasks: Vec::new(),
        }
    }

    pub fn has_assertions(&self) -> bool {
        self.tasks.iter().any(|t| !t.assertions.is_empty())
    }

    /// Render the report as triples: the execution node, its task nodes,
    /// their assertions, and one `schema:DataDownload` per harvested
    /// document.
    pub fn to_graph(&self) -> Result<Graph, HarvestError> {
        let mut graph = Graph::new();
        let exec = uuid_urn(&self.id)?;

        graph.insert(&Triple::new(
            exec.clone(),
            rdf::TYPE,
            tharv("ExecutionReport")?,
        ));
        graph.insert(&Triple::new(
            exec.clone(),
            tharv("configName")?,
            Literal::new_simple_literal(&self.config_name),
        ));
        graph.insert(&Triple::new(
            exec.clone(),
            NamedNode::new(DCT_MODIFIED).expect("valid IRI"),
            datetime_literal(&self.last_mod),
        ));

        for task in &self.tasks {
            let task_node = uuid_urn(&task.id)?;
            graph.insert(&Triple::new(
                task_node.clone(),
                rdf::TYPE,
                tharv("TaskReport")?,
            ));
            graph.insert(&Triple::new(
                task_node.clone(),
                tharv("executionReport")?,
                exec.clone(),
            ));
            graph.insert(&Triple::new(
                task_node.clone(),
                NamedNode::new(DCT_MODIFIED).expect("valid IRI"),
                datetime_literal(&task.last_mod),
            ));
            for assertion in &task.assertions {
                insert_assertion(&mut graph, &task_node, assertion)?;
            }
        }
        Ok(graph)
    }
}

fn insert_assertion(
    graph: &mut Graph,
    task_node: &NamedNode,
    record: &AssertionRecord,
) -> Result<(), HarvestError> {
    let node = uuid_urn(&record.id)?;
    graph.insert(&Triple::new(node.clone(), rdf::TYPE, tharv("PathAssertion")?));
    graph.insert(&Triple::new(
        task_node.clone(),
        tharv("pathAssertion")?,
        node.clone(),
    ));
    let subject_term = NamedNode::new(&record.subject)
        .map_err(|_| HarvestError::InvalidSubject(record.subject.clone()))?;
    graph.insert(&Triple::new(node.clone(), tharv("subject")?, subject_term));
    graph.insert(&Triple::new(
        node.clone(),
        tharv("assertionPath")?,
        Literal::new_simple_literal(&record.path_text),
    ));
    graph.insert(&Triple::new(
        node.clone(),
        tharv("result")?,
        Literal::new_typed_literal(record.result.to_string(), xsd::BOOLEAN),
    ));
    graph.insert(&Triple::new(
        node.clone(),
        tharv("timestamp")?,
        datetime_literal(&record.timestamp),
    ));
    graph.insert(&Triple::new(
        node.clone(),
        tharv("message")?,
        Literal::new_simple_literal(&record.message),
    ));

    for added in &record.graphs_added {
        let download = uuid_urn(&added.id)?;
        graph.insert(&Triple::new(
            download.clone(),
            rdf::TYPE,
            schema("DataDownload")?,
        ));
        graph.insert(&Triple::new(
            node.clone(),
            tharv("graphAddition")?,
            download.clone(),
        ));
        let content_url = NamedNode::new(&added.url)
            .map_err(|_| HarvestError::InvalidSubject(added.url.clone()))?;
        graph.insert(&Triple::new(
            download.clone(),
            schema("contentUrl")?,
            content_url,
        ));
        graph.insert(&Triple::new(
            download.clone(),
            schema("encodingFormat")?,
            Literal::new_simple_literal(&added.mime_type),
        ));
        graph.insert(&Triple::new(
            download.clone(),
            NamedNode::new(VOID_TRIPLES).expect("valid IRI"),
            Literal::new_typed_literal(added.triple_count.to_string(), xsd::INTEGER),
        ));
    }
    Ok(())
}

fn tharv(local: &str) -> Result<NamedNode, HarvestError> {
    NamedNode::new(format!("{THARV}{local}"))
        .map_err(|e| HarvestError::Config(format!("bad vocabulary term '{local}': {e}")))
}

fn schema(local: &str) -> Result<NamedNode, HarvestError> {
    NamedNode::new(format!("{SCHEMA}{local}"))
        .map_err(|e| HarvestError::Config(format!("bad vocabulary term '{local}': {e}")))
}

fn uuid_urn(id: &Uuid) -> Result<NamedNode, HarvestError> {
    NamedNode::new(format!("urn:uuid:{id}"))
        .map_err(|e| HarvestError::Config(format!("bad report node id: {e}")))
}

fn datetime_literal(ts: &DateTime<Utc>) -> Literal {
    Literal::new_typed_literal(ts.to_rfc3339_opts(SecondsFormat::Secs, true), xsd::DATE_TIME)
}

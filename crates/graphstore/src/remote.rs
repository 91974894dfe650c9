use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use oxigraph::model::{Graph, NamedNode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::Row;

/// Default upper bound on the textual size of one `INSERT DATA` batch.
pub const DEFAULT_MAX_STR_SIZE: usize = 4096;

const USER_AGENT: &str = concat!("lodharv/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 8;
const BACKOFF_FACTOR: f64 = 0.4;
const RETRY_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

const MODIFIED_IRI: &str = "http://purl.org/dc/terms/modified";
const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// SPARQL 1.1 protocol backend: a read endpoint for queries and a write
/// endpoint for updates, with `lastmod` bookkeeping in an admin named graph.
pub struct RemoteBackend {
    read_uri: String,
    write_uri: String,
    admin_ng: String,
    agent: ureq::Agent,
    max_str_size: usize,
}

#[derive(Deserialize)]
struct SparqlResultsJson {
    head: SparqlHead,
    #[serde(default)]
    results: SparqlBindings,
}

#[derive(Deserialize)]
struct SparqlHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Deserialize, Default)]
struct SparqlBindings {
    #[serde(default)]
    bindings: Vec<BTreeMap<String, SparqlTerm>>,
}

#[derive(Deserialize)]
struct SparqlTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
    datatype: Option<String>,
}

impl RemoteBackend {
    pub fn new(read_uri: &str, write_uri: &str, admin_ng: &str) -> Self {
        Self {
            read_uri: read_uri.to_string(),
            write_uri: write_uri.to_string(),
            admin_ng: admin_ng.to_string(),
            agent: ureq::agent(),
            max_str_size: DEFAULT_MAX_STR_SIZE,
        }
    }

    pub fn with_max_str_size(mut self, max_str_size: usize) -> Self {
        self.max_str_size = max_str_size;
        self
    }

    pub fn select(&self, sparql: &str) -> Result<Vec<Row>, StoreError> {
        let response = send_with_retry(|| {
            self.agent
                .post(&self.read_uri)
                .set("Accept", "application/sparql-results+json")
                .set("User-Agent", USER_AGENT)
                .send_form(&[("query", sparql)])
        });
        let response = match response {
            Ok(r) => r,
            // A 4xx on the read endpoint ends up as an empty result set so
            // subject selection keeps going; the query itself is logged.
            Err(ureq::Error::Status(code, _)) if (400..500).contains(&code) => {
                warn!(code, sparql, "read endpoint rejected query, returning empty result");
                return Ok(Vec::new());
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(StoreError::Backend(format!(
                    "read endpoint returned status {code}"
                )))
            }
            Err(e) => return Err(StoreError::Transport(e.to_string())),
        };
        let parsed: SparqlResultsJson = response
            .into_json()
            .map_err(|e| StoreError::Backend(format!("invalid SPARQL JSON results: {e}")))?;
        let mut rows = Vec::new();
        for binding in parsed.results.bindings {
            let row: Row = parsed
                .head
                .vars
                .iter()
                .filter_map(|var| {
                    binding
                        .get(var)
                        .map(|term| (var.clone(), encode_term(term)))
                })
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn update(&self, update: &str) -> Result<(), StoreError> {
        let response = send_with_retry(|| {
            self.agent
                .post(&self.write_uri)
                .set("User-Agent", USER_AGENT)
                .send_form(&[("update", update)])
        });
        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(StoreError::Backend(format!(
                "write endpoint returned status {code}"
            ))),
            Err(e) => Err(StoreError::Transport(e.to_string())),
        }
    }

    /// Insert the graph into the named graph in deduplicated N-Triples
    /// batches bounded by `max_str_size`, then stamp the graph's lastmod in
    /// the admin graph.
    pub fn insert(&self, graph: &Graph, named_graph: &NamedNode) -> Result<(), StoreError> {
        let lines: BTreeSet<String> = graph.iter().map(|t| ntriples_line(t)).collect();
        let batches = pack_batches(lines, self.max_str_size)?;
        debug!(
            named_graph = named_graph.as_str(),
            batches = batches.len(),
            "inserting"
        );
        for batch in batches {
            self.update(&format!(
                "INSERT DATA {{ GRAPH <{}> {{\n{}\n}} }}",
                named_graph.as_str(),
                batch
            ))?;
            self.record_lastmod(named_graph)?;
        }
        Ok(())
    }

    fn record_lastmod(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.update(&format!(
            "DELETE WHERE {{ GRAPH <{admin}> {{ <{ng}> <{modified}> ?m }} }} ;\n\
             INSERT DATA {{ GRAPH <{admin}> {{ <{ng}> <{modified}> \"{now}\"^^<{dt}> }} }}",
            admin = self.admin_ng,
            ng = named_graph.as_str(),
            modified = MODIFIED_IRI,
            dt = XSD_DATETIME,
        ))
    }

    pub fn lastmod_ts(&self, named_graph: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let rows = self.select(&format!(
            "SELECT ?m WHERE {{ GRAPH <{admin}> {{ <{ng}> <{modified}> ?m }} }} \
             ORDER BY DESC(?m) LIMIT 1",
            admin = self.admin_ng,
            ng = named_graph,
            modified = MODIFIED_IRI,
        ))?;
        let Some((_, term)) = rows.first().and_then(|row| row.first()) else {
            return Ok(None);
        };
        let value = crate::term_value(term);
        let ts = DateTime::parse_from_rfc3339(&value)
            .map_err(|e| StoreError::Backend(format!("bad lastmod timestamp '{value}': {e}")))?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    pub fn drop_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        self.update(&format!("DROP SILENT GRAPH <{}>", named_graph.as_str()))
    }

    /// Remove the graph's admin record; the graph contents are untouched.
    pub fn forget_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        self.update(&format!(
            "DELETE WHERE {{ GRAPH <{admin}> {{ <{ng}> ?p ?o }} }}",
            admin = self.admin_ng,
            ng = named_graph.as_str(),
        ))
    }

    pub fn named_graphs(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.select("SELECT DISTINCT ?g WHERE { GRAPH ?g { ?s ?p ?o } }")?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first())
            .map(|(_, term)| crate::term_value(term))
            .collect())
    }
}

/// Issue a request, retrying retryable statuses with exponential backoff
/// (`0.4 · 2^(n−1)` seconds, at most 8 attempts).
fn send_with_retry<F>(mut call: F) -> Result<ureq::Response, ureq::Error>
where
    F: FnMut() -> Result<ureq::Response, ureq::Error>,
{
    let mut attempt = 1;
    loop {
        match call() {
            Err(ureq::Error::Status(code, _))
                if RETRY_STATUS.contains(&code) && attempt < MAX_ATTEMPTS =>
            {
                let delay = BACKOFF_FACTOR * 2f64.powi(attempt as i32 - 1);
                debug!(code, attempt, delay, "retrying request");
                thread::sleep(Duration::from_secs_f64(delay));
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Partition N-Triples lines into newline-joined batches whose textual size
/// stays within `max_str_size`. A single line that cannot fit is fatal.
pub fn pack_batches(
    lines: impl IntoIterator<Item = String>,
    max_str_size: usize,
) -> Result<Vec<String>, StoreError> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in lines {
        if line.len() > max_str_size {
            return Err(StoreError::OversizedStatement {
                size: line.len(),
                max: max_str_size,
            });
        }
        if !current.is_empty() && current.len() + 1 + line.len() > max_str_size {
            batches.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}

/// Render one triple as an N-Triples statement.
fn ntriples_line(triple: oxigraph::model::TripleRef<'_>) -> String {
    format!(
        "{} {} {} .",
        triple.subject, triple.predicate, triple.object
    )
}

/// Re-encode a SPARQL JSON results term in N-Triples syntax, matching the
/// row shape of the memory backend.
fn encode_term(term: &SparqlTerm) -> String {
    match term.kind.as_str() {
        "uri" => format!("<{}>", term.value),
        "bnode" => format!("_:{}", term.value),
        _ => {
            let escaped = term
                .value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n")
                .replace('\r', "\\r");
            if let Some(lang) = &term.lang {
                format!("\"{escaped}\"@{lang}")
            } else if let Some(datatype) = &term.datatype {
                format!("\"{escaped}\"^^<{datatype}>")
            } else {
                format!("\"{escaped}\"")
            }
        }
    }
}

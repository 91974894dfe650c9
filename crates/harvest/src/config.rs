use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use oxigraph::model::NamedNode;
use oxigraph::sparql::Query;
use serde::Deserialize;
use tracing::{debug, info, warn};
use urikit::{inject_prefixes, resolve_path, NamespaceManager};

use graphstore::StoreAccess;

use crate::error::HarvestError;

/// One property path to assert, resolved to step IRIs at build time.
#[derive(Debug, Clone)]
pub struct AssertPath {
    source: String,
    steps: Vec<NamedNode>,
}

impl AssertPath {
    pub fn resolve(text: &str, nsm: &NamespaceManager) -> Result<Self, HarvestError> {
        let steps = resolve_path(text, nsm)
            .map_err(|e| HarvestError::Config(format!("path '{text}': {e}")))?;
        Ok(Self {
            source: text.to_string(),
            steps,
        })
    }

    pub fn steps(&self) -> &[NamedNode] {
        &self.steps
    }

    /// Number of steps in the full path.
    pub fn max_size(&self) -> usize {
        self.steps.len()
    }

    /// The first `len` steps.
    pub fn sub_path(&self, len: usize) -> &[NamedNode] {
        &self.steps[..len]
    }

    /// Render the first `len` steps the way they appear in trajectory
    /// queries and reports.
    pub fn text_for_depth(&self, len: usize) -> String {
        self.steps[..len]
            .iter()
            .map(|step| format!("<{}>", step.as_str()))
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

impl fmt::Display for AssertPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Where a task's subjects come from: a literal list, or a SPARQL query
/// evaluated lazily against the store at task start.
#[derive(Debug, Clone)]
pub enum SubjectDefinition {
    Literal(Vec<String>),
    Sparql(String),
}

impl SubjectDefinition {
    pub fn list_subjects(&self, store: &StoreAccess) -> Result<Vec<String>, HarvestError> {
        match self {
            Self::Literal(subjects) => Ok(subjects.clone()),
            Self::Sparql(sparql) => Ok(store.select_subjects(sparql)?),
        }
    }
}

/// A subject definition paired with the paths to assert about each subject.
#[derive(Debug, Clone)]
pub struct Task {
    pub subjects: SubjectDefinition,
    pub paths: Vec<AssertPath>,
}

/// A built job configuration. Snoozed configs never reach this type.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub nsm: NamespaceManager,
    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "snooze-till-graph-age-minutes")]
    snooze_till_graph_age_minutes: u64,
    #[serde(default)]
    prefix: BTreeMap<String, String>,
    assert: Vec<RawAssert>,
}

#[derive(Deserialize)]
struct RawAssert {
    subjects: RawSubjects,
    paths: Vec<String>,
}

#[derive(Deserialize)]
struct RawSubjects {
    literal: Option<Vec<String>>,
    #[serde(rename = "SPARQL")]
    sparql: Option<String>,
}

/// Builds `Config`s from YAML job files, applying the snooze rule against
/// the store's freshness records.
pub struct ConfigBuilder<'a> {
    store: &'a StoreAccess,
}

impl<'a> ConfigBuilder<'a> {
    pub fn new(store: &'a StoreAccess) -> Self {
        Self { store }
    }

    /// Build one config from a file. Returns `None` when the snooze rule
    /// decides the config's graph is still fresh enough.
    pub fn build_from_config(&self, path: &Path) -> Result<Option<Config>, HarvestError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HarvestError::Config(format!("bad config path '{}'", path.display())))?
            .to_string();
        let text = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
        let raw = parse_raw(&text, &name)?;

        if self.should_snooze(&name, raw.snooze_till_graph_age_minutes, path) {
            info!(
                config = name.as_str(),
                minutes = raw.snooze_till_graph_age_minutes,
                "snoozing config"
            );
            return Ok(None);
        }

        let nsm: NamespaceManager = raw
            .prefix
            .iter()
            .map(|(p, ns)| (p.as_str(), ns.as_str()))
            .collect();

        let mut tasks = Vec::new();
        for assert_task in &raw.assert {
            tasks.push(build_task(assert_task, &nsm, &name)?);
        }
        debug!(config = name.as_str(), tasks = tasks.len(), "config built");
        Ok(Some(Config { name, nsm, tasks }))
    }

    /// Build every `*.yml`/`*.yaml` in a folder, lexicographically. Any load
    /// failure aborts the whole folder build; snoozed configs are simply
    /// absent from the result.
    pub fn build_from_folder(&self, folder: &Path) -> Result<Vec<Config>, HarvestError> {
        let mut paths: Vec<_> = std::fs::read_dir(folder)
            .map_err(|e| HarvestError::io(folder, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HarvestError::io(folder, e))?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| {
                            let e = e.to_ascii_lowercase();
                            e == "yml" || e == "yaml"
                        })
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut configs = Vec::new();
        for path in paths {
            if let Some(config) = self.build_from_config(&path)? {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    /// A config is skipped when its graph was modified more recently than
    /// the snooze window allows, unless the config file itself is newer than
    /// that modification.
    fn should_snooze(&self, name: &str, snooze_minutes: u64, path: &Path) -> bool {
        let lastmod = match self.store.lastmod_ts_for_config(name) {
            Ok(Some(lastmod)) => lastmod,
            Ok(None) => return false,
            Err(e) => {
                warn!(config = name, error = %e, "could not read lastmod, not snoozing");
                return false;
            }
        };
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from);
        if let Ok(mtime) = mtime {
            if mtime > lastmod {
                debug!(config = name, "config file newer than its graph, bypassing snooze");
                return false;
            }
        }
        self.store
            .verify_max_age_of_config(name, snooze_minutes)
            .unwrap_or(false)
    }
}

fn parse_raw(text: &str, name: &str) -> Result<RawConfig, HarvestError> {
    // top-level keys are case-insensitive: fold before typed deserialisation
    let value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| HarvestError::Config(format!("{name}: {e}")))?;
    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(HarvestError::Config(format!(
            "{name}: config must be a mapping"
        )));
    };
    let folded: serde_yaml::Mapping = mapping
        .into_iter()
        .map(|(k, v)| match k {
            serde_yaml::Value::String(s) => (serde_yaml::Value::String(s.to_lowercase()), v),
            other => (other, v),
        })
        .collect();
    let raw: RawConfig = serde_yaml::from_value(serde_yaml::Value::Mapping(folded))
        .map_err(|e| HarvestError::Config(format!("{name}: {e}")))?;
    if raw.assert.is_empty() {
        return Err(HarvestError::Config(format!(
            "{name}: 'assert' must list at least one task"
        )));
    }
    Ok(raw)
}

fn build_task(raw: &RawAssert, nsm: &NamespaceManager, name: &str) -> Result<Task, HarvestError> {
    let subjects = match (&raw.subjects.literal, &raw.subjects.sparql) {
        (Some(literal), None) => SubjectDefinition::Literal(literal.clone()),
        (None, Some(sparql)) => {
            let injected = inject_prefixes(sparql, nsm);
            Query::parse(&injected, None).map_err(|e| {
                HarvestError::Config(format!("{name}: subjects SPARQL does not parse: {e}"))
            })?;
            SubjectDefinition::Sparql(injected)
        }
        _ => {
            return Err(HarvestError::Config(format!(
                "{name}: subjects must hold exactly one of 'literal' or 'SPARQL'"
            )))
        }
    };
    if raw.paths.is_empty() {
        return Err(HarvestError::Config(format!(
            "{name}: 'paths' must list at least one property path"
        )));
    }
    let paths = raw
        .paths
        .iter()
        .map(|p| AssertPath::resolve(p, nsm))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Task { subjects, paths })
}

use oxigraph::model::NamedNode;

use crate::nsm::NamespaceManager;
use crate::uri::resolve_uri;
use crate::UriError;

/// Split a textual property path on `/`, ignoring separators inside an
/// angle-bracketed `<…>` region. Brackets are stripped from the returned
/// steps and surrounding whitespace is trimmed; an empty step is an error.
pub fn split_path(text: &str) -> Result<Vec<String>, UriError> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut in_iri = false;
    for ch in text.chars() {
        match ch {
            '<' if !in_iri => in_iri = true,
            '>' if in_iri => in_iri = false,
            '/' if !in_iri => {
                push_step(&mut steps, &mut current, text)?;
            }
            _ => current.push(ch),
        }
    }
    if in_iri {
        return Err(UriError::UnclosedIri(text.to_string()));
    }
    push_step(&mut steps, &mut current, text)?;
    Ok(steps)
}

fn push_step(steps: &mut Vec<String>, current: &mut String, text: &str) -> Result<(), UriError> {
    let step = current.trim();
    if step.is_empty() {
        return Err(UriError::EmptyPathStep(text.to_string()));
    }
    steps.push(step.to_string());
    current.clear();
    Ok(())
}

/// Resolve a textual property path to its ordered step IRIs.
pub fn resolve_path(text: &str, nsm: &NamespaceManager) -> Result<Vec<NamedNode>, UriError> {
    split_path(text)?
        .iter()
        .map(|step| resolve_uri(step, nsm))
        .collect()
}

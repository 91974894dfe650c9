/// Prefix-to-namespace bindings for CURIE expansion and SPARQL prefix
/// injection. Bindings keep their insertion order so injected `PREFIX` lines
/// are deterministic; rebinding an existing prefix overwrites in place.
#[derive(Debug, Clone, Default)]
pub struct NamespaceManager {
    bindings: Vec<(String, String)>,
}

impl NamespaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a prefix to a namespace IRI.
    pub fn bind(&mut self, prefix: &str, namespace: &str) {
        if let Some(slot) = self.bindings.iter_mut().find(|(p, _)| p == prefix) {
            slot.1 = namespace.to_string();
        } else {
            self.bindings.push((prefix.to_string(), namespace.to_string()));
        }
    }

    /// Look up the namespace IRI bound to a prefix.
    pub fn expand(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    /// Iterate over `(prefix, namespace)` bindings in insertion order.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, S)> for NamespaceManager {
    fn from_iter<T: IntoIterator<Item = (S, S)>>(iter: T) -> Self {
        let mut nsm = Self::new();
        for (p, ns) in iter {
            nsm.bind(p.as_ref(), ns.as_ref());
        }
        nsm
    }
}

/// Prepend a `PREFIX` line for every binding to a SPARQL query string.
pub fn inject_prefixes(sparql: &str, nsm: &NamespaceManager) -> String {
    let mut out = String::new();
    for (prefix, ns) in nsm.namespaces() {
        out.push_str(&format!("PREFIX {prefix}: <{ns}>\n"));
    }
    out.push_str(sparql);
    out
}

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::formats::{JSON_LD, TURTLE};

/// LOD material found in an HTML document: signposting links (absolute) and
/// embedded RDF script bodies with their media type.
#[derive(Debug, Default)]
pub struct LodHints {
    pub links: Vec<String>,
    pub scripts: Vec<(String, String)>,
}

/// Collect `<link rel="describedby">` targets and inline
/// `<script type="application/ld+json"|"text/turtle">` bodies. Relative
/// hrefs are resolved against the request URL; unresolvable ones are
/// dropped.
pub fn extract_lod_hints(html: &str, request_url: &str) -> LodHints {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse(r#"link[rel="describedby"]"#).expect("valid selector");
    let script_selector = Selector::parse("script").expect("valid selector");

    let mut hints = LodHints::default();
    let base = Url::parse(request_url).ok();

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let absolute = if href.starts_with("http") {
            Some(href.to_string())
        } else {
            base.as_ref()
                .and_then(|b| b.join(href).ok())
                .map(String::from)
        };
        if let Some(url) = absolute {
            hints.links.push(url);
        }
    }

    for script in document.select(&script_selector) {
        let Some(media_type) = script.value().attr("type") else {
            continue;
        };
        if media_type == JSON_LD || media_type == TURTLE {
            let body: String = script.text().collect();
            if !body.trim().is_empty() {
                hints.scripts.push((media_type.to_string(), body));
            }
        }
    }

    debug!(
        links = hints.links.len(),
        scripts = hints.scripts.len(),
        request_url,
        "extracted LOD hints"
    );
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <link rel="stylesheet" href="style.css">
  <link rel="describedby" href="data/description.ttl">
  <link rel="describedby" href="https://example.org/other.ttl">
  <script type="application/ld+json">{"@id": "http://example.org/x"}</script>
  <script type="text/javascript">var x = 1;</script>
</head>
<body>
  <script type="text/turtle"><http://example.org/a> <http://example.org/p> <http://example.org/b> .</script>
</body>
</html>"#;

    #[test]
    fn test_extracts_describedby_links_resolving_relative() {
        let hints = extract_lod_hints(PAGE, "https://data.example.org/release/index.html");
        assert_eq!(
            hints.links,
            vec![
                "https://data.example.org/release/data/description.ttl",
                "https://example.org/other.ttl"
            ]
        );
    }

    #[test]
    fn test_extracts_rdf_scripts_only() {
        let hints = extract_lod_hints(PAGE, "https://data.example.org/");
        assert_eq!(hints.scripts.len(), 2);
        assert_eq!(hints.scripts[0].0, JSON_LD);
        assert_eq!(hints.scripts[1].0, TURTLE);
        assert!(hints.scripts[1].1.contains("<http://example.org/a>"));
    }

    #[test]
    fn test_no_hints_in_plain_html() {
        let hints = extract_lod_hints("<html><body><p>hello</p></body></html>", "http://x.org/");
        assert!(hints.links.is_empty());
        assert!(hints.scripts.is_empty());
    }
}

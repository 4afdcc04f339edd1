//! Edge extraction: discovers cross-document links without ever
//! rewriting the sovereign document's own bytes.
//!
//! Markdown link scanning via `pulldown-cmark`, classifying links by
//! target shape and recording the source line. Parsing a full spec
//! document is out of scope here; this module is the stand-in markdown
//! extractor the sovereign store calls for files it recognizes, and is
//! itself the kind of pluggable phase this design invites — for unknown
//! file types the list is simply empty.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use super::types::DiscoveredEdge;

/// Extract edges appropriate to the document's kind, inferred from `path`'s
/// extension. Unknown extensions yield an empty list.
pub fn extract_edges(path: &str, content: &str) -> Vec<DiscoveredEdge> {
    if path.ends_with(".md") || path.ends_with(".markdown") {
        extract_markdown_edges(content)
    } else {
        Vec::new()
    }
}

fn line_of(content: &str, offset: usize) -> u32 {
    content.as_bytes()[..offset.min(content.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
        + 1
}

fn extract_markdown_edges(content: &str) -> Vec<DiscoveredEdge> {
    let mut edges = Vec::new();
    let parser = Parser::new_ext(content, Options::all()).into_offset_iter();

    let mut current_link: Option<(String, usize)> = None;
    let mut link_text = String::new();

    for (event, range) in parser {
        match event {
            Event::Start(Tag::Link { dest_url, .. }) => {
                current_link = Some((dest_url.to_string(), range.start));
                link_text.clear();
            }
            Event::Text(text) if current_link.is_some() => {
                link_text.push_str(&text);
            }
            Event::End(TagEnd::Link) => {
                if let Some((dest, offset)) = current_link.take() {
                    if let Some(edge) = classify(&dest, &link_text, offset, content) {
                        edges.push(edge);
                    }
                }
            }
            _ => {}
        }
    }

    edges
}

fn classify(dest: &str, text: &str, offset: usize, content: &str) -> Option<DiscoveredEdge> {
    if dest.starts_with('#') {
        return None; // anchor link — not a cross-document edge
    }
    Some(DiscoveredEdge {
        kind: "references".to_string(),
        target: dest.to_string(),
        line_number: Some(line_of(content, offset)),
        context: Some(text.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_link_becomes_a_references_edge() {
        let content = "# X\nsee [Y](spec/y.md)\n";
        let edges = extract_edges("spec/x.md", content);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, "references");
        assert_eq!(edges[0].target, "spec/y.md");
        assert_eq!(edges[0].line_number, Some(2));
    }

    #[test]
    fn unknown_extension_yields_no_edges() {
        let edges = extract_edges("data.bin", "see [Y](spec/y.md)");
        assert!(edges.is_empty());
    }

    #[test]
    fn anchor_links_are_not_edges() {
        let edges = extract_edges("spec/x.md", "see [here](#section)");
        assert!(edges.is_empty());
    }
}

//! Explicit markup tree.
//!
//! HTML is parsed once (html5ever via `scraper`, which recovers from any
//! malformed input) and copied into a plain [`Node`] tree so the block
//! converter can walk it with ordinary pattern matching. Rendering is the
//! inverse: a pure recursive serializer with deterministic attribute order.

use ego_tree::NodeRef;
use scraper::{Html, Node as HtmlNode};

/// One node of a parsed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        tag: String,
        /// Attributes sorted by name.
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
    Text(String),
    Comment(String),
}

impl Node {
    pub fn element(tag: &str, attrs: Vec<(String, String)>, children: Vec<Node>) -> Self {
        Node::Element {
            tag: tag.to_string(),
            attrs,
            children,
        }
    }

    /// Tag name for elements, `None` otherwise.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// True for text nodes that contain only whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }

    /// Concatenated text content of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(t),
        Node::Element { children, .. } => children.iter().for_each(|c| collect_text(c, out)),
        Node::Comment(_) => {}
    }
}

/// Parse an HTML fragment into its top-level nodes.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .children()
        .filter_map(convert)
        .collect()
}

fn convert(node: NodeRef<'_, HtmlNode>) -> Option<Node> {
    match node.value() {
        HtmlNode::Text(t) => Some(Node::Text(t.text.to_string())),
        HtmlNode::Comment(c) => Some(Node::Comment(c.comment.to_string())),
        HtmlNode::Element(e) => {
            let mut attrs: Vec<(String, String)> = e
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            attrs.sort();
            Some(Node::Element {
                tag: e.name().to_string(),
                attrs,
                children: node.children().filter_map(convert).collect(),
            })
        }
        _ => None,
    }
}

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Serialize a node to HTML.
pub fn render(node: &Node) -> String {
    let mut out = String::new();
    render_into(node, &mut out);
    out
}

/// Serialize a sequence of nodes to HTML.
pub fn render_all(nodes: &[Node]) -> String {
    let mut out = String::new();
    for n in nodes {
        render_into(n, &mut out);
    }
    out
}

fn render_into(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&escape_text(t)),
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&escape_attr(v));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for c in children {
                render_into(c, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_level_nodes() {
        let nodes = parse_fragment("<p>a</p>\n<h2>b</h2>tail");
        let tags: Vec<Option<&str>> = nodes.iter().map(Node::tag).collect();
        assert_eq!(tags, vec![Some("p"), None, Some("h2"), None]);
        assert!(nodes[1].is_blank_text());
        assert_eq!(nodes[3], Node::Text("tail".to_string()));
    }

    #[test]
    fn render_round_trips_simple_markup() {
        let html = "<p class=\"x\">a &amp; b<br>c</p>";
        let nodes = parse_fragment(html);
        assert_eq!(render_all(&nodes), html);
    }

    #[test]
    fn attributes_are_sorted() {
        let nodes = parse_fragment("<a title=\"t\" href=\"/x\">l</a>");
        assert_eq!(render_all(&nodes), "<a href=\"/x\" title=\"t\">l</a>");
    }

    #[test]
    fn malformed_markup_recovers() {
        let nodes = parse_fragment("<p><b>unclosed<p>next");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].text_content(), "next");
    }

    #[test]
    fn escapes_quotes_in_attributes() {
        let node = Node::element(
            "img",
            vec![("alt".to_string(), "say \"hi\"".to_string())],
            vec![],
        );
        assert_eq!(render(&node), "<img alt=\"say &quot;hi&quot;\">");
    }
}

//! Block annotation stage.
//!
//! Walks the top-level nodes of an HTML fragment and wraps each in a block
//! comment pair understood by the content store's editor:
//!
//! ```text
//! <!-- wp:heading {"level":3} -->
//! <h3>Title</h3>
//! <!-- /wp:heading -->
//! ```
//!
//! | Top-level node | Block |
//! |----------------|-------|
//! | `p` | `paragraph` |
//! | `h1`–`h6` | `heading` (`level` attr unless 2) |
//! | `ul` / `ol` | `list` (`ordered` attr for `ol`) |
//! | `blockquote` | `quote` |
//! | `pre` | `code` |
//! | `hr` | `separator` |
//! | `table` | `table` (wrapped in a `figure`) |
//! | `figure`, `img` | `image` |
//! | `div`, `section`, `article`, ... | `group` (children blockified recursively) |
//! | inline elements and text | `paragraph` around the whole run |
//! | anything else | passed through verbatim, no wrapper |

use serde_json::{json, Map, Value};

use super::tree::{escape_text, parse_fragment, render, render_all, Node};

/// Marker that identifies already-annotated content.
pub const BLOCK_MARKER: &str = "<!-- wp:";

/// Containers converted into `group` blocks.
const GROUP_TAGS: &[&str] = &[
    "div", "section", "article", "aside", "header", "footer", "main", "nav",
];

/// Phrasing elements that belong inside a paragraph.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "i",
    "ins", "kbd", "mark", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup",
    "time", "u", "var",
];

/// True when `html` already carries block annotations.
pub fn has_block_annotations(html: &str) -> bool {
    html.contains(BLOCK_MARKER)
}

/// Wrap every top-level element of `html` in a block annotation.
///
/// Already-annotated input is returned unchanged. This never fails: if the
/// fragment yields no blocks although it contains text, the whole input
/// becomes one paragraph block of escaped text.
pub fn blockify(html: &str) -> String {
    if has_block_annotations(html) {
        return html.to_string();
    }
    if html.trim().is_empty() {
        return String::new();
    }

    let nodes = parse_fragment(html);
    let out = blockify_nodes(&nodes);

    if out.trim().is_empty() && !strip_tags(html).trim().is_empty() {
        tracing::debug!("block conversion produced no output; degrading to paragraph");
        return fallback_paragraph(html);
    }
    out
}

/// One paragraph block containing `raw` as escaped text.
pub fn fallback_paragraph(raw: &str) -> String {
    let p = format!("<p>{}</p>", escape_text(raw.trim()));
    wrap("paragraph", None, &p)
}

fn blockify_nodes(nodes: &[Node]) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    for node in nodes {
        if is_inline(node) {
            inline_run.push(node.clone());
            continue;
        }
        flush_inline(&mut inline_run, &mut blocks);
        if let Some(block) = convert_block(node) {
            blocks.push(block);
        }
    }
    flush_inline(&mut inline_run, &mut blocks);

    blocks.join("\n\n")
}

fn is_inline(node: &Node) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Element { tag, .. } => INLINE_TAGS.contains(&tag.as_str()),
        Node::Comment(_) => false,
    }
}

fn flush_inline(run: &mut Vec<Node>, blocks: &mut Vec<String>) {
    if run.iter().all(Node::is_blank_text) {
        run.clear();
        return;
    }
    let inner = render_all(run).trim().to_string();
    run.clear();
    blocks.push(wrap("paragraph", None, &format!("<p>{}</p>", inner)));
}

fn convert_block(node: &Node) -> Option<String> {
    let Node::Element {
        tag,
        attrs,
        children,
    } = node
    else {
        // Comments pass through untouched.
        return Some(render(node));
    };

    let block = match tag.as_str() {
        "p" => {
            if node.text_content().trim().is_empty() && !has_media(children) {
                return None;
            }
            wrap("paragraph", None, &render(node))
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level: u8 = tag[1..].parse().unwrap_or(2);
            let attrs_json = (level != 2).then(|| json_attrs(&[("level", json!(level))]));
            wrap("heading", attrs_json.as_deref(), &render(node))
        }
        "ul" => wrap("list", None, &render(node)),
        "ol" => wrap(
            "list",
            Some(&json_attrs(&[("ordered", json!(true))])),
            &render(node),
        ),
        "blockquote" => wrap(
            "quote",
            None,
            &render(&with_class(node, "wp-block-quote")),
        ),
        "pre" => wrap("code", None, &render(&with_class(node, "wp-block-code"))),
        "hr" => wrap(
            "separator",
            None,
            &render(&with_class(node, "wp-block-separator")),
        ),
        "table" => {
            let figure = Node::element(
                "figure",
                vec![("class".to_string(), "wp-block-table".to_string())],
                vec![node.clone()],
            );
            wrap("table", None, &render(&figure))
        }
        "figure" => wrap("image", None, &render(&with_class(node, "wp-block-image"))),
        "img" => {
            let figure = Node::element(
                "figure",
                vec![("class".to_string(), "wp-block-image".to_string())],
                vec![node.clone()],
            );
            wrap("image", None, &render(&figure))
        }
        t if GROUP_TAGS.contains(&t) => {
            let inner = blockify_nodes(children);
            if inner.trim().is_empty() {
                return None;
            }
            let mut attrs = attrs.clone();
            add_class(&mut attrs, "wp-block-group");
            let open = render(&Node::element(t, attrs, vec![]));
            // `open` is "<tag ...></tag>" for non-void tags; keep only the start tag.
            let start = open.trim_end_matches(&format!("</{}>", t));
            wrap("group", None, &format!("{}\n{}\n</{}>", start, inner, t))
        }
        _ => render(node),
    };
    Some(block)
}

fn has_media(children: &[Node]) -> bool {
    children.iter().any(|c| match c {
        Node::Element { tag, children, .. } => {
            matches!(tag.as_str(), "img" | "video" | "audio") || has_media(children)
        }
        _ => false,
    })
}

fn wrap(name: &str, attrs_json: Option<&str>, html: &str) -> String {
    match attrs_json {
        Some(a) => format!("<!-- wp:{} {} -->\n{}\n<!-- /wp:{} -->", name, a, html, name),
        None => format!("<!-- wp:{} -->\n{}\n<!-- /wp:{} -->", name, html, name),
    }
}

fn json_attrs(pairs: &[(&str, Value)]) -> String {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    Value::Object(map).to_string()
}

fn with_class(node: &Node, class: &str) -> Node {
    match node {
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            let mut attrs = attrs.clone();
            add_class(&mut attrs, class);
            Node::Element {
                tag: tag.clone(),
                attrs,
                children: children.clone(),
            }
        }
        other => other.clone(),
    }
}

fn add_class(attrs: &mut Vec<(String, String)>, class: &str) {
    if let Some((_, v)) = attrs.iter_mut().find(|(k, _)| k == "class") {
        if !v.split_whitespace().any(|c| c == class) {
            *v = if v.trim().is_empty() {
                class.to_string()
            } else {
                format!("{} {}", class, v.trim())
            };
        }
        return;
    }
    attrs.push(("class".to_string(), class.to_string()));
    attrs.sort();
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

//! Content transformation pipeline.
//!
//! Converts the text of one archive entry into the block-annotated rich
//! content stored in a record body. Two stages:
//!
//! 1. **To HTML**, dispatched on [`ContentKind`]:
//!    - plain text → one `<p>` per blank-line-delimited run,
//!    - markup (Markdown) → CommonMark with tables, footnotes, and
//!      strikethrough, then sanitized,
//!    - rich markup (HTML) → sanitized against an allow-list.
//! 2. **Blockify** ([`blockify::blockify`]) → one block annotation per
//!    top-level element.
//!
//! Each call builds its own parser, so stateful counters such as footnote
//! numbering start fresh for every file.

pub mod blockify;
pub mod tree;

use std::path::Path;

use pulldown_cmark::{html, Options, Parser};

use self::blockify::{blockify, has_block_annotations};
use self::tree::escape_text;

/// Recognized content file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `.txt`
    PlainText,
    /// `.md`, `.markdown`
    Markup,
    /// `.html`, `.htm`
    RichMarkup,
}

impl ContentKind {
    /// Kind for a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(ContentKind::PlainText),
            "md" | "markdown" => Some(ContentKind::Markup),
            "html" | "htm" => Some(ContentKind::RichMarkup),
            _ => None,
        }
    }

    /// Kind for a path inside an archive; `None` for unsupported files.
    pub fn from_filename(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::PlainText => "plain text",
            ContentKind::Markup => "markdown",
            ContentKind::RichMarkup => "html",
        }
    }
}

/// Transform `text` into block-annotated content.
///
/// Input that already carries block annotations is returned unchanged, so
/// `transform(transform(x)) == transform(x)`.
pub fn transform(text: &str, kind: ContentKind) -> String {
    if has_block_annotations(text) {
        return text.to_string();
    }
    let html = match kind {
        ContentKind::PlainText => plain_to_html(text),
        ContentKind::Markup => sanitize(&markdown_to_html(text)),
        ContentKind::RichMarkup => sanitize(text),
    };
    blockify(&html)
}

/// Paragraphs from blank-line-delimited runs; single newlines become `<br>`.
pub fn plain_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(paragraph(&current));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(paragraph(&current));
    }

    paragraphs.join("\n")
}

fn paragraph(lines: &[&str]) -> String {
    let body: Vec<String> = lines.iter().map(|l| escape_text(l)).collect();
    format!("<p>{}</p>", body.join("<br>\n"))
}

/// Render Markdown to HTML with a fresh parser.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Strip everything outside the allow-list of safe tags and attributes.
///
/// Uses ammonia's default allow-list (no scripts, styles, event handlers, or
/// `javascript:` URLs), extended with `class` and `id` so footnote anchors
/// and code-language classes survive.
pub fn sanitize(html: &str) -> String {
    let mut builder = ammonia::Builder::default();
    builder
        .add_generic_attributes(&["class", "id"])
        .add_tag_attributes("ol", &["start"]);
    builder.clean(html).to_string()
}

/// Collapsed, truncated plain-text preview for dry-run logs.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars).collect();
    format!("{}…", truncated.trim_end())
}

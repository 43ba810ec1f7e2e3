//! Markdown handling for docsync.
//!
//! - [`convert`] / [`convert_fragment`] turn fetched HTML into clean Markdown
//!   using the `htmd` crate followed by cleanup passes.
//! - [`headings`] scans Markdown for real headings (fence-aware, ATX and setext).
//! - [`text`] reduces Markdown to plain text for topic descriptions.

mod cleanup;
pub mod headings;
pub mod text;

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use docsync_shared::{DocSyncError, Result};

pub use headings::{Heading, bold_leads, clean_heading_text, outline, scan, split_lines};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting an HTML page to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The cleaned Markdown content.
    pub markdown: String,
    /// Title from the option override or the first H1.
    pub title: Option<String>,
}

/// Options for the HTML-to-Markdown conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Source URL, used for tracing only.
    pub source_url: String,
    /// Override title (if `None`, extracted from the first H1).
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert a full HTML document to clean Markdown.
///
/// Locates the main content container first, then runs [`convert_fragment`].
#[instrument(skip(html), fields(url = %opts.source_url))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let content_html = extract_content_html(html);
    convert_fragment(&content_html, opts)
}

/// Convert pre-extracted content HTML (from a platform adapter) to Markdown.
#[instrument(skip(content_html), fields(url = %opts.source_url))]
pub fn convert_fragment(content_html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg", "button"])
        .build();

    let raw_markdown = converter
        .convert(content_html)
        .map_err(|e| DocSyncError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");

    let markdown = cleanup::run_pipeline(&raw_markdown);
    let title = opts.title.clone().or_else(|| first_h1(&markdown));

    debug!(?title, final_len = markdown.len(), "conversion complete");

    Ok(ConvertResult { markdown, title })
}

/// Normalize a Markdown page served as-is (no HTML conversion).
pub fn normalize_markdown(md: &str, opts: &ConvertOptions) -> ConvertResult {
    let markdown = cleanup::run_pipeline(md);
    let title = opts.title.clone().or_else(|| first_h1(&markdown));
    ConvertResult { markdown, title }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the main content HTML, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let selectors = [
        "article .markdown",
        ".vp-doc",
        "[role=\"main\"]",
        "article",
        "main",
        ".content",
        "body",
    ];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}

fn first_h1(md: &str) -> Option<String> {
    scan(md).into_iter().find(|h| h.level == 1).map(|h| h.text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Platform adapter trait and built-in adapters.
//!
//! Adapters detect specific documentation platforms (Docusaurus, VitePress)
//! and know where each keeps its article body and its sidebar navigation.
//! The fetcher only follows navigation links, which keeps a run bounded to
//! the documentation tree instead of every link on the page.

mod docusaurus;
mod generic;
mod vitepress;

use scraper::{Html, Selector};
use url::Url;

pub use docusaurus::DocusaurusAdapter;
pub use generic::GenericAdapter;
pub use vitepress::VitePressAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Content extraction result from an adapter.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Clean HTML content (nav/footer/chrome stripped).
    pub html: String,
    /// Page title from the first H1, if any.
    pub title: Option<String>,
}

/// Trait for platform-specific content and navigation extraction.
///
/// Adapters are tried in priority order; `GenericAdapter` is the always-last fallback.
pub trait PlatformAdapter: Send + Sync {
    /// Returns `true` if this adapter should handle the document.
    fn detect(&self, doc: &Html, url: &Url) -> bool;

    /// Links from the site navigation (sidebar, pager), resolved against `base`.
    fn nav_links(&self, doc: &Html, base: &Url) -> Vec<Url>;

    /// Extract the main content as clean HTML.
    fn extract_content(&self, doc: &Html) -> ExtractedContent;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters (platform-specific first, generic last).
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(DocusaurusAdapter),
                Box::new(VitePressAdapter),
                Box::new(GenericAdapter),
            ],
        }
    }

    /// Detect the best adapter for the given HTML document.
    pub fn detect(&self, doc: &Html, url: &Url) -> &dyn PlatformAdapter {
        self.adapters
            .iter()
            .find(|adapter| adapter.detect(doc, url))
            .map_or(&GenericAdapter as &dyn PlatformAdapter, |adapter| adapter.as_ref())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolve every `href` matched by `selector`, dropping anchors, `javascript:`
/// and `mailto:` links. Fragments are stripped; order is document order.
pub(crate) fn collect_links(doc: &Html, selector: &str, base: &Url) -> Vec<Url> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        if let Ok(mut resolved) = base.join(href) {
            resolved.set_fragment(None);
            if !links.contains(&resolved) {
                links.push(resolved);
            }
        }
    }
    links
}

/// Extract the H1 title from any document.
pub(crate) fn extract_h1(doc: &Html) -> Option<String> {
    let sel = Selector::parse("h1").ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Remove elements matching `selector` from an HTML fragment.
pub(crate) fn strip_elements(html: &str, selector: &str) -> String {
    let Ok(sel) = Selector::parse(selector) else {
        return html.to_string();
    };
    let fragment = Html::parse_fragment(html);

    let mut result = html.to_string();
    for el in fragment.select(&sel) {
        result = result.replace(&el.html(), "");
    }
    result
}

/// First element matched by any of `selectors`, as inner HTML.
pub(crate) fn first_inner_html(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel_str| {
        let sel = Selector::parse(sel_str).ok()?;
        doc.select(&sel).next().map(|el| el.inner_html())
    })
}

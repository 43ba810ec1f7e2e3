//! Generic (fallback) platform adapter.
//!
//! Always matches. Navigation comes from `<nav>`/sidebar elements; pages
//! without any navigation fall back to links inside the content area.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, collect_links, extract_h1, first_inner_html, strip_elements};

/// Generic adapter that works on arbitrary HTML pages.
pub struct GenericAdapter;

const CONTENT_SELECTORS: [&str; 5] = ["main", "article", r#"[role="main"]"#, ".content", "body"];

impl PlatformAdapter for GenericAdapter {
    fn detect(&self, _doc: &Html, _url: &Url) -> bool {
        true
    }

    fn nav_links(&self, doc: &Html, base: &Url) -> Vec<Url> {
        let nav = collect_links(
            doc,
            "nav a[href], aside a[href], .sidebar a[href], .toc a[href], [role=\"navigation\"] a[href]",
            base,
        );
        if !nav.is_empty() {
            return nav;
        }

        CONTENT_SELECTORS
            .iter()
            .map(|container| collect_links(doc, &format!("{container} a[href]"), base))
            .find(|links| !links.is_empty())
            .unwrap_or_default()
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let html = first_inner_html(doc, &CONTENT_SELECTORS).unwrap_or_default();
        ExtractedContent {
            html: strip_elements(
                &html,
                "nav, header, footer, aside, script, style, .sidebar, .nav",
            ),
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "generic"
    }
}

//! VitePress platform adapter.

use scraper::{Html, Selector};
use url::Url;

use super::{ExtractedContent, PlatformAdapter, collect_links, extract_h1, first_inner_html};

/// Detects and extracts content from VitePress-powered documentation sites.
pub struct VitePressAdapter;

impl PlatformAdapter for VitePressAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        Selector::parse("#VPContent, .VPDoc")
            .map(|sel| doc.select(&sel).next().is_some())
            .unwrap_or(false)
    }

    fn nav_links(&self, doc: &Html, base: &Url) -> Vec<Url> {
        let mut links = collect_links(doc, ".VPSidebar a[href]", base);
        for link in collect_links(doc, ".VPDocFooter .pager a[href]", base) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
        links
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        ExtractedContent {
            html: first_inner_html(doc, &[".vp-doc", ".VPDoc", "#VPContent main", "main"])
                .unwrap_or_default(),
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "vitepress"
    }
}

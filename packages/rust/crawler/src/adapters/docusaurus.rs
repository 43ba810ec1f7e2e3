//! Docusaurus platform adapter.

use scraper::{Html, Selector};
use url::Url;

use super::{
    ExtractedContent, PlatformAdapter, collect_links, extract_h1, first_inner_html,
    strip_elements,
};

/// Detects and extracts content from Docusaurus-powered documentation sites.
pub struct DocusaurusAdapter;

impl PlatformAdapter for DocusaurusAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        // <meta name="generator" content="Docusaurus ...">
        if let Ok(meta_sel) = Selector::parse(r#"meta[name="generator"]"#) {
            let by_generator = doc.select(&meta_sel).any(|el| {
                el.value()
                    .attr("content")
                    .is_some_and(|content| content.to_lowercase().contains("docusaurus"))
            });
            if by_generator {
                return true;
            }
        }

        Selector::parse("[data-docusaurus-version], .theme-doc-markdown")
            .map(|sel| doc.select(&sel).next().is_some())
            .unwrap_or(false)
    }

    fn nav_links(&self, doc: &Html, base: &Url) -> Vec<Url> {
        let mut links = collect_links(doc, ".menu__list a.menu__link[href]", base);
        for link in collect_links(doc, ".pagination-nav a[href]", base) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
        links
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let html = first_inner_html(doc, &["article .markdown", "article", ".markdown", "main", "body"])
            .unwrap_or_default();

        ExtractedContent {
            html: strip_elements(&html, ".theme-doc-footer, .pagination-nav, .theme-doc-toc-mobile"),
            title: extract_h1(doc),
        }
    }

    fn name(&self) -> &str {
        "docusaurus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><meta name="generator" content="Docusaurus v3"></head><body>
        <nav class="menu"><ul class="menu__list">
            <li><a class="menu__link" href="/docs/agents">Agents</a></li>
            <li><a class="menu__link" href="/docs/memory">Memory</a></li>
        </ul></nav>
        <article><div class="markdown"><h1>Agents</h1><p>Build one.</p></div>
        <footer class="theme-doc-footer"><a href="/edit">Edit this page</a></footer></article>
        <nav class="pagination-nav"><a href="/docs/memory">Next</a></nav>
    </body></html>"#;

    #[test]
    fn nav_links_come_from_sidebar_and_pager() {
        let doc = Html::parse_document(PAGE);
        let base = Url::parse("https://docs.example.com/docs/agents").unwrap();
        let links: Vec<String> = DocusaurusAdapter
            .nav_links(&doc, &base)
            .into_iter()
            .map(|u| u.path().to_string())
            .collect();
        assert_eq!(links, vec!["/docs/agents", "/docs/memory"]);
    }

    #[test]
    fn content_excludes_edit_footer() {
        let doc = Html::parse_document(PAGE);
        let content = DocusaurusAdapter.extract_content(&doc);
        assert!(content.html.contains("Build one."));
        assert!(!content.html.contains("Edit this page"));
        assert_eq!(content.title.as_deref(), Some("Agents"));
    }
}

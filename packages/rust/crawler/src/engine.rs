//! Bounded, concurrent, same-domain fetcher.
//!
//! Starting from a root URL the fetcher walks the site's navigation
//! breadth-first, inside the root's host and path prefix, until it runs out
//! of links, depth, page budget or time. Every page that could not be added
//! is recorded as an [`Omission`]; a fetch run never fails as a whole.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use docsync_markdown::{ConvertOptions, ConvertResult};
use docsync_shared::{
    Corpus, CorpusPage, DocSyncError, FetchConfig, FetchError, Omission, Result,
};

use crate::adapters::AdapterRegistry;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("docsync/", env!("CARGO_PKG_VERSION"));

static MARKDOWN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receives progress callbacks while a fetch run is in flight.
pub trait FetchObserver: Send + Sync {
    /// A page was added to the corpus; `fetched` is the running total.
    fn page_fetched(&self, _page_id: &str, _fetched: usize) {}

    /// A page was left out of the corpus.
    fn page_omitted(&self, _omission: &Omission) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl FetchObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// A page fetched and normalized by a worker task.
#[derive(Debug)]
struct FetchedPage {
    page: CorpusPage,
    links: Vec<Url>,
}

/// Concurrent documentation fetcher.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
    registry: Arc<AdapterRegistry>,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl Fetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DocSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            registry: Arc::new(AdapterRegistry::new()),
            allow_localhost: false,
        })
    }

    /// Allow fetching from localhost/private IPs (for tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch the documentation tree under `root`.
    pub async fn fetch(&self, root: &Url) -> Corpus {
        self.fetch_observed(root, &NoopObserver).await
    }

    /// Fetch the documentation tree under `root`, reporting progress to `observer`.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn fetch_observed(&self, root: &Url, observer: &dyn FetchObserver) -> Corpus {
        let started = Instant::now();
        let deadline = started + self.config.run_timeout;
        let concurrency = self.config.concurrency.max(1) as usize;

        let scope = FetchScope::new(root, &self.config);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut corpus = Corpus {
            root: root.to_string(),
            ..Corpus::default()
        };
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut queue: Vec<(Url, u32)> = vec![(root.clone(), 0)];
        let mut scheduled: usize = 0;

        info!(
            max_depth = self.config.max_depth,
            max_pages = self.config.max_pages,
            concurrency,
            run_timeout_secs = self.config.run_timeout.as_secs(),
            "starting fetch"
        );

        while !queue.is_empty() {
            let batch: Vec<(Url, u32)> = {
                let drain_count = queue.len().min(concurrency);
                queue.drain(..drain_count).collect()
            };

            let mut in_flight = Vec::new();

            for (url, depth) in batch {
                if !visited.insert(canonical_url(&url)) {
                    continue;
                }

                if !scope.in_scope(&url) {
                    debug!(%url, "out of scope, skipping");
                    continue;
                }

                if scheduled >= self.config.max_pages {
                    debug!(%url, max_pages = self.config.max_pages, "page budget spent, skipping");
                    continue;
                }

                let mut url = url;
                url.set_fragment(None);

                if !self.allow_localhost && is_ssrf_target(&url) {
                    warn!(%url, "SSRF protection: blocked");
                    record_omission(&mut corpus, observer, &url, FetchError::Blocked {
                        url: url.to_string(),
                    });
                    continue;
                }

                if Instant::now() >= deadline {
                    record_omission(&mut corpus, observer, &url, FetchError::TimedOut {
                        url: url.to_string(),
                    });
                    continue;
                }

                scheduled += 1;

                let client = self.client.clone();
                let registry = Arc::clone(&self.registry);
                let sem = Arc::clone(&semaphore);
                let rate_limit = self.config.rate_limit_ms;
                let task_url = url.clone();

                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.map_err(|e| FetchError::Network {
                        url: task_url.to_string(),
                        message: format!("worker pool closed: {e}"),
                    })?;

                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    fetch_page(&client, &registry, &task_url).await
                });

                in_flight.push((url, depth, handle));
            }

            for (url, depth, mut handle) in in_flight {
                let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_err)) => Err(FetchError::Network {
                        url: url.to_string(),
                        message: format!("fetch task failed: {join_err}"),
                    }),
                    Err(_) => {
                        handle.abort();
                        Err(FetchError::TimedOut {
                            url: url.to_string(),
                        })
                    }
                };

                let fetched = match outcome {
                    Ok(fetched) => fetched,
                    Err(error) => {
                        warn!(%url, %error, "page omitted");
                        record_omission(&mut corpus, observer, &url, error);
                        continue;
                    }
                };

                if !seen_hashes.insert(fetched.page.content_hash.clone()) {
                    debug!(%url, "duplicate content, skipping");
                    continue;
                }
                if corpus.pages.contains_key(&fetched.page.id) {
                    debug!(%url, page_id = %fetched.page.id, "page id already taken, skipping");
                    continue;
                }

                if depth < self.config.max_depth {
                    queue.extend(fetched.links.into_iter().map(|link| (link, depth + 1)));
                }

                let page_id = fetched.page.id.clone();
                corpus.pages.insert(page_id.clone(), fetched.page);
                observer.page_fetched(&page_id, corpus.pages.len());
            }
        }

        info!(
            pages = corpus.pages.len(),
            omissions = corpus.omissions.len(),
            duration_ms = started.elapsed().as_millis(),
            "fetch completed"
        );

        corpus
    }
}

fn record_omission(corpus: &mut Corpus, observer: &dyn FetchObserver, url: &Url, error: FetchError) {
    let omission = Omission {
        page_id: url_to_path(url),
        error,
    };
    observer.page_omitted(&omission);
    corpus.omissions.push(omission);
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs belong to the documentation tree being fetched.
struct FetchScope {
    /// Path prefix taken from the root's directory.
    base_path: String,
    base_host: String,
    base_port: Option<u16>,
    /// Include patterns (if non-empty, the path must match at least one).
    include_patterns: Vec<Regex>,
    /// Exclude patterns (if the path matches any, it's excluded).
    exclude_patterns: Vec<Regex>,
}

impl FetchScope {
    fn new(root: &Url, config: &FetchConfig) -> Self {
        let path = root.path();
        let base_path = match path.rfind('/') {
            Some(idx) => path[..=idx].to_string(),
            None => "/".to_string(),
        };

        Self {
            base_path,
            base_host: root.host_str().unwrap_or("").to_string(),
            base_port: root.port_or_known_default(),
            include_patterns: config
                .include_patterns
                .iter()
                .filter_map(|p| glob_to_regex(p))
                .collect(),
            exclude_patterns: config
                .exclude_patterns
                .iter()
                .filter_map(|p| glob_to_regex(p))
                .collect(),
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        if url.host_str().unwrap_or("") != self.base_host
            || url.port_or_known_default() != self.base_port
        {
            return false;
        }

        let path = url.path();
        if !path.starts_with(&self.base_path) && format!("{path}/") != self.base_path {
            return false;
        }
        if self.exclude_patterns.iter().any(|p| p.is_match(path)) {
            return false;
        }
        self.include_patterns.is_empty() || self.include_patterns.iter().any(|p| p.is_match(path))
    }
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// How a response body should be read.
#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Html,
    Markdown,
}

/// Route a response by its `Content-Type`, sniffing the body when the header
/// is missing or generic.
fn classify_body(content_type: Option<&str>, body: &str) -> std::result::Result<BodyKind, String> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => Ok(BodyKind::Html),
        "text/markdown" | "text/x-markdown" => Ok(BodyKind::Markdown),
        "" | "text/plain" => {
            if looks_like_html(body) {
                Ok(BodyKind::Html)
            } else {
                Ok(BodyKind::Markdown)
            }
        }
        _ => Err(mime),
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Fetch a single page and normalize it to Markdown.
async fn fetch_page(
    client: &Client,
    registry: &AdapterRegistry,
    url: &Url,
) -> std::result::Result<FetchedPage, FetchError> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Refuse binary payloads before reading them.
    if let Some(ct) = content_type.as_deref() {
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if !mime.starts_with("text/") && !mime.contains("xml") && !mime.contains("markdown") {
            return Err(FetchError::NonText {
                url: url.to_string(),
                content_type: mime,
            });
        }
    }

    let body = response.text().await.map_err(|e| FetchError::Network {
        url: url.to_string(),
        message: format!("body read failed: {e}"),
    })?;

    build_page(registry, url, content_type.as_deref(), &body)
}

/// Turn a response body into a corpus page plus the links to follow.
fn build_page(
    registry: &AdapterRegistry,
    url: &Url,
    content_type: Option<&str>,
    body: &str,
) -> std::result::Result<FetchedPage, FetchError> {
    let kind = classify_body(content_type, body).map_err(|content_type| FetchError::NonText {
        url: url.to_string(),
        content_type,
    })?;

    let (converted, links) = match kind {
        BodyKind::Html => {
            let doc = Html::parse_document(body);
            let adapter = registry.detect(&doc, url);
            let extracted = adapter.extract_content(&doc);
            let links = adapter.nav_links(&doc, url);
            debug!(%url, adapter = adapter.name(), links = links.len(), "html page");

            let opts = ConvertOptions {
                source_url: url.to_string(),
                title: extracted.title,
            };
            let converted = if extracted.html.trim().is_empty() {
                debug!(%url, adapter = adapter.name(), "adapter found no content, converting whole page");
                docsync_markdown::convert(body, &opts)
            } else {
                docsync_markdown::convert_fragment(&extracted.html, &opts)
            }
            .map_err(|e| FetchError::Unreadable {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            (converted, links)
        }
        BodyKind::Markdown => {
            let opts = ConvertOptions {
                source_url: url.to_string(),
                title: None,
            };
            (docsync_markdown::normalize_markdown(body, &opts), markdown_links(body, url))
        }
    };

    let ConvertResult {
        markdown, title, ..
    } = converted;

    if markdown.trim().is_empty() {
        return Err(FetchError::Unreadable {
            url: url.to_string(),
            message: "no readable content".into(),
        });
    }

    let headings = docsync_markdown::outline(&markdown);

    Ok(FetchedPage {
        page: CorpusPage {
            id: url_to_path(url),
            url: url.to_string(),
            title,
            headings,
            content_hash: compute_hash(body),
            markdown,
        },
        links,
    })
}

/// Inline Markdown links, resolved against the page URL.
fn markdown_links(md: &str, base: &Url) -> Vec<Url> {
    let mut links = Vec::new();
    for caps in MARKDOWN_LINK_RE.captures_iter(md) {
        let href = &caps[1];
        if href.starts_with('#') || href.starts_with("mailto:") {
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

/// Canonical form used for deduplication: no fragment, no query, no
/// `index.html`, no trailing slash except on the root path.
pub fn canonical_url(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    canonical.set_query(None);

    let mut path = canonical.path().to_string();
    for index in ["index.html", "index.htm"] {
        if path.ends_with(&format!("/{index}")) {
            path.truncate(path.len() - index.len());
        }
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical.to_string()
}

/// Convert a URL path to a page identifier (`guide/tools`, `index`).
pub fn url_to_path(url: &Url) -> String {
    let cleaned = url
        .path()
        .trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches(".html")
        .trim_end_matches(".htm")
        .trim_end_matches(".md");
    let cleaned = cleaned.strip_suffix("/index").unwrap_or(cleaned);

    if cleaned.is_empty() {
        "index".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

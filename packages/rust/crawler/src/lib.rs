//! Reference documentation fetcher and platform adapters.
//!
//! This crate provides:
//! - [`adapters`]: platform-specific content and navigation extractors (Docusaurus, VitePress, generic)
//! - [`AdapterRegistry`]: detects the best adapter for a given HTML document
//! - [`engine`]: the bounded, concurrent [`Fetcher`] that builds a [`Corpus`](docsync_shared::Corpus)

pub mod adapters;
pub mod engine;

pub use adapters::{
    AdapterRegistry, DocusaurusAdapter, ExtractedContent, GenericAdapter, PlatformAdapter,
    VitePressAdapter,
};
pub use engine::{FetchObserver, Fetcher, NoopObserver, canonical_url, url_to_path};

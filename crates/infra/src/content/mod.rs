//! The day's content: a same-day file cache read by the pipeline, and the
//! fetcher that refreshes it from the quote API.

pub mod cache;
pub mod fetch;

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use mindfuel_core::Content;

pub use cache::{CachedContentProvider, CachedQuote, Freshness};
pub use fetch::{ContentFetcher, FetchedQuote, HttpQuoteApi, QuoteApi, parse_api_payload};

#[derive(Debug, Error)]
pub enum ContentError {
    /// No valid cached or freshly fetched content exists for today.
    #[error("content unavailable: {0}")]
    Unavailable(String),

    #[error("content fetch failed: {0}")]
    Fetch(String),

    #[error("content io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed content: {0}")]
    Malformed(String),
}

/// Content provider port.
#[async_trait::async_trait]
pub trait ContentProvider: Send + Sync {
    async fn todays_content(&self, today: NaiveDate) -> Result<Content, ContentError>;
}

#[async_trait::async_trait]
impl<P> ContentProvider for Arc<P>
where
    P: ContentProvider + ?Sized,
{
    async fn todays_content(&self, today: NaiveDate) -> Result<Content, ContentError> {
        (**self).todays_content(today).await
    }
}

/// Fixed content, for tests/dev.
#[derive(Debug, Clone)]
pub struct StaticContentProvider {
    content: Option<Content>,
}

impl StaticContentProvider {
    pub fn new(content: Content) -> Self {
        Self {
            content: Some(content),
        }
    }

    /// A provider that always reports content as unavailable.
    pub fn unavailable() -> Self {
        Self { content: None }
    }
}

#[async_trait::async_trait]
impl ContentProvider for StaticContentProvider {
    async fn todays_content(&self, _today: NaiveDate) -> Result<Content, ContentError> {
        self.content
            .clone()
            .ok_or_else(|| ContentError::Unavailable("no content configured".to_string()))
    }
}

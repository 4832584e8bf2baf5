use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use mindfuel_core::Content;

use super::{ContentError, ContentProvider};
use crate::io::{atomic_write_async, read_optional_async};

/// On-disk cache layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedQuote {
    pub quote: String,
    pub author: String,
    pub date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

impl CachedQuote {
    pub fn into_content(self) -> Content {
        Content {
            body: self.quote,
            attribution: self.author,
            date: self.date,
        }
    }
}

/// How old a cached quote may be and still be served.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Freshness {
    /// Only a quote dated today (calendar-day boundary).
    #[default]
    SameDay,
    /// Any well-formed cached quote.
    Any,
}

impl Freshness {
    pub fn accepts(&self, cached: NaiveDate, today: NaiveDate) -> bool {
        match self {
            Freshness::SameDay => cached == today,
            Freshness::Any => true,
        }
    }
}

/// Content provider backed by the JSON cache file.
#[derive(Debug, Clone)]
pub struct CachedContentProvider {
    path: PathBuf,
    freshness: Freshness,
}

impl CachedContentProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            freshness: Freshness::default(),
        }
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse and validate the cache file. `Ok(None)` when it does not exist.
    pub async fn load(&self) -> Result<Option<CachedQuote>, ContentError> {
        let Some(text) = read_optional_async(self.path.clone()).await? else {
            return Ok(None);
        };
        let cached: CachedQuote = serde_json::from_str(&text)
            .map_err(|e| ContentError::Malformed(format!("cache file {}: {e}", self.path.display())))?;
        if cached.quote.trim().is_empty() || cached.author.trim().is_empty() {
            return Err(ContentError::Malformed(
                "cached quote or author is empty".to_string(),
            ));
        }
        Ok(Some(cached))
    }

    /// The cached quote if it is valid and fresh for `today`.
    ///
    /// Missing, corrupt or stale caches are all `None`; the reason is logged.
    pub async fn fresh(&self, today: NaiveDate) -> Option<CachedQuote> {
        match self.load().await {
            Ok(Some(cached)) if self.freshness.accepts(cached.date, today) => Some(cached),
            Ok(Some(cached)) => {
                debug!(cached_date = %cached.date, %today, "cached quote is stale");
                None
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no cached quote file");
                None
            }
            Err(e) => {
                warn!(error = %e, "cached quote unusable");
                None
            }
        }
    }

    pub async fn store(&self, cached: &CachedQuote) -> Result<(), ContentError> {
        let bytes = serde_json::to_vec_pretty(cached)
            .map_err(|e| ContentError::Malformed(e.to_string()))?;
        atomic_write_async(self.path.clone(), bytes).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentProvider for CachedContentProvider {
    #[instrument(skip(self), fields(path = %self.path.display()), err)]
    async fn todays_content(&self, today: NaiveDate) -> Result<Content, ContentError> {
        let cached = match self.load().await? {
            Some(cached) => cached,
            None => {
                return Err(ContentError::Unavailable(format!(
                    "no cached quote at {}",
                    self.path.display()
                )));
            }
        };
        if !self.freshness.accepts(cached.date, today) {
            return Err(ContentError::Unavailable(format!(
                "cached quote is from {}, expected {today}",
                cached.date
            )));
        }
        Ok(cached.into_content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn quote(date: NaiveDate) -> CachedQuote {
        CachedQuote {
            quote: "Well begun is half done.".to_string(),
            author: "Aristotle".to_string(),
            date,
            fetched_at: Utc.with_ymd_and_hms(2025, 3, 4, 5, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn serves_todays_quote() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CachedContentProvider::new(dir.path().join("quote.json"));
        provider.store(&quote(day(4))).await.unwrap();

        let content = provider.todays_content(day(4)).await.unwrap();
        assert_eq!(content.attribution, "Aristotle");
        assert_eq!(content.date, day(4));
    }

    #[tokio::test]
    async fn stale_quote_is_unavailable_unless_any_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quote.json");
        let provider = CachedContentProvider::new(&path);
        provider.store(&quote(day(3))).await.unwrap();

        assert!(matches!(
            provider.todays_content(day(4)).await,
            Err(ContentError::Unavailable(_))
        ));
        assert!(provider.fresh(day(4)).await.is_none());

        let lenient = CachedContentProvider::new(&path).with_freshness(Freshness::Any);
        assert!(lenient.todays_content(day(4)).await.is_ok());
    }

    #[tokio::test]
    async fn missing_keys_are_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quote.json");
        std::fs::write(&path, r#"{"quote":"q","author":"a","date":"2025-03-04"}"#).unwrap();

        let provider = CachedContentProvider::new(&path);
        assert!(matches!(
            provider.todays_content(day(4)).await,
            Err(ContentError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn empty_author_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CachedContentProvider::new(dir.path().join("quote.json"));
        let mut bad = quote(day(4));
        bad.author = "  ".to_string();
        provider.store(&bad).await.unwrap();

        assert!(provider.load().await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CachedContentProvider::new(dir.path().join("absent.json"));
        assert!(matches!(
            provider.todays_content(day(4)).await,
            Err(ContentError::Unavailable(_))
        ));
    }
}

//! Refreshing the content cache from the quote API.
//!
//! The API answers with a JSON array whose first element carries the quote
//! text in `q` and the author in `a`.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use mindfuel_core::Content;

use super::{ContentError, ContentProvider};
use super::cache::{CachedContentProvider, CachedQuote};
use crate::retry::RetryPolicy;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A quote pulled from the API, before it is stamped with a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedQuote {
    pub quote: String,
    pub author: String,
}

#[derive(Debug, Deserialize)]
struct ApiQuote {
    q: Option<String>,
    a: Option<String>,
}

/// Validate an API response body and extract its first quote.
pub fn parse_api_payload(body: &str) -> Result<FetchedQuote, ContentError> {
    let items: Vec<ApiQuote> = serde_json::from_str(body)
        .map_err(|e| ContentError::Malformed(format!("api response is not a quote list: {e}")))?;
    let first = items
        .into_iter()
        .next()
        .ok_or_else(|| ContentError::Malformed("api returned an empty list".to_string()))?;

    match (first.q, first.a) {
        (Some(quote), Some(author)) if !quote.trim().is_empty() && !author.trim().is_empty() => {
            Ok(FetchedQuote {
                quote: quote.trim().to_string(),
                author: author.trim().to_string(),
            })
        }
        _ => Err(ContentError::Malformed(
            "quote or author missing from api response".to_string(),
        )),
    }
}

/// Source of quotes. Abstracted so the refresh loop is testable without HTTP.
#[async_trait::async_trait]
pub trait QuoteApi: Send + Sync {
    async fn fetch(&self) -> Result<FetchedQuote, ContentError>;
}

/// Quote API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpQuoteApi {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpQuoteApi {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    fn host(&self) -> &str {
        self.url.split('/').nth(2).unwrap_or(&self.url)
    }
}

#[async_trait::async_trait]
impl QuoteApi for HttpQuoteApi {
    #[instrument(skip(self), fields(host = %self.host()), err)]
    async fn fetch(&self) -> Result<FetchedQuote, ContentError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContentError::Fetch("request timed out".to_string())
                } else {
                    ContentError::Fetch(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ContentError::Fetch(format!("reading response body: {e}")))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(ContentError::Fetch(format!("status {status}: {snippet}")));
        }
        parse_api_payload(&body)
    }
}

/// Keeps the content cache current.
pub struct ContentFetcher<A> {
    api: A,
    cache: CachedContentProvider,
    retry: RetryPolicy,
}

impl<A: QuoteApi> ContentFetcher<A> {
    /// Four tries, waiting 1s, 2s then 4s between them.
    pub fn new(api: A, cache: CachedContentProvider) -> Self {
        Self {
            api,
            cache,
            retry: RetryPolicy::exponential(4, Duration::from_secs(1)),
        }
    }

    /// Ensure the cache holds today's quote, fetching it if needed.
    ///
    /// A valid cache for today short-circuits without touching the API.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<Content, ContentError> {
        self.refresh_for(now.date_naive(), now).await
    }

    async fn refresh_for(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Content, ContentError> {
        if let Some(cached) = self.cache.fresh(today).await {
            info!(
                preview = %cached.clone().into_content().preview(20),
                "quote already cached for today"
            );
            return Ok(cached.into_content());
        }

        let fetched = self.fetch_with_retry().await?;
        let cached = CachedQuote {
            quote: fetched.quote,
            author: fetched.author,
            date: today,
            fetched_at: now,
        };
        self.cache.store(&cached).await?;
        info!(path = %self.cache.path().display(), author = %cached.author, "quote cached");
        Ok(cached.into_content())
    }

    async fn fetch_with_retry(&self) -> Result<FetchedQuote, ContentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.fetch().await {
                Ok(quote) => return Ok(quote),
                Err(e) if self.retry.should_retry(attempt) => {
                    let wait = self.retry.delay_for_attempt(attempt);
                    warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "quote fetch failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(attempts = attempt, error = %e, "quote fetch exhausted retries");
                    return Err(ContentError::Unavailable(format!(
                        "fetch failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }
}

/// Serves the cached quote, falling back to the API when the cache misses.
#[async_trait::async_trait]
impl<A: QuoteApi> ContentProvider for ContentFetcher<A> {
    async fn todays_content(&self, today: NaiveDate) -> Result<Content, ContentError> {
        self.refresh_for(today, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ScriptedApi {
        responses: Arc<Mutex<VecDeque<Result<FetchedQuote, ContentError>>>>,
        calls: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    impl ScriptedApi {
        fn push(&self, response: Result<FetchedQuote, ContentError>) {
            self.responses.lock().push_back(response);
        }
    }

    #[async_trait::async_trait]
    impl QuoteApi for ScriptedApi {
        async fn fetch(&self) -> Result<FetchedQuote, ContentError> {
            self.calls.lock().push(tokio::time::Instant::now());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ContentError::Fetch("no scripted response".to_string())))
        }
    }

    fn quote() -> FetchedQuote {
        FetchedQuote {
            quote: "Act as if what you do makes a difference.".to_string(),
            author: "William James".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 6, 0, 0).unwrap()
    }

    #[test]
    fn parses_first_item() {
        let parsed = parse_api_payload(r#"[{"q":" Hello ","a":"Someone","h":"<b>"}]"#).unwrap();
        assert_eq!(parsed.quote, "Hello");
        assert_eq!(parsed.author, "Someone");
    }

    #[test]
    fn rejects_empty_and_partial_payloads() {
        assert!(parse_api_payload("[]").is_err());
        assert!(parse_api_payload(r#"[{"q":"only a quote"}]"#).is_err());
        assert!(parse_api_payload(r#"{"q":"x","a":"y"}"#).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_doubling_waits_then_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CachedContentProvider::new(dir.path().join("quote.json"));
        let api = ScriptedApi::default();
        api.push(Err(ContentError::Fetch("timeout".to_string())));
        api.push(Err(ContentError::Fetch("timeout".to_string())));
        api.push(Ok(quote()));

        let fetcher = ContentFetcher::new(api.clone(), cache.clone());
        let content = fetcher.refresh(now()).await.unwrap();
        assert_eq!(content.attribution, "William James");

        let calls = api.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));

        let stored = cache.load().await.unwrap().unwrap();
        assert_eq!(stored.date, now().date_naive());
        assert_eq!(stored.fetched_at, now());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_four_tries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CachedContentProvider::new(dir.path().join("quote.json"));
        let api = ScriptedApi::default();

        let fetcher = ContentFetcher::new(api.clone(), cache.clone());
        assert!(matches!(
            fetcher.refresh(now()).await,
            Err(ContentError::Unavailable(_))
        ));
        assert_eq!(api.calls.lock().len(), 4);
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_api() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CachedContentProvider::new(dir.path().join("quote.json"));
        cache
            .store(&CachedQuote {
                quote: "Cached".to_string(),
                author: "Anon".to_string(),
                date: now().date_naive(),
                fetched_at: now(),
            })
            .await
            .unwrap();
        let api = ScriptedApi::default();

        let content = ContentFetcher::new(api.clone(), cache).refresh(now()).await.unwrap();
        assert_eq!(content.body, "Cached");
        assert!(api.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_fetches_on_a_cache_miss_then_serves_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CachedContentProvider::new(dir.path().join("quote.json"));
        cache
            .store(&CachedQuote {
                quote: "Yesterday's".to_string(),
                author: "Anon".to_string(),
                date: now().date_naive().pred_opt().unwrap(),
                fetched_at: now(),
            })
            .await
            .unwrap();
        let api = ScriptedApi::default();
        api.push(Err(ContentError::Fetch("timeout".to_string())));
        api.push(Ok(quote()));

        let provider = ContentFetcher::new(api.clone(), cache.clone());
        let today = now().date_naive();
        let content = provider.todays_content(today).await.unwrap();
        assert_eq!(content.attribution, "William James");
        assert_eq!(content.date, today);

        let again = provider.todays_content(today).await.unwrap();
        assert_eq!(again, content);
        assert_eq!(api.calls.lock().len(), 2);
        assert_eq!(cache.load().await.unwrap().unwrap().date, today);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_reports_unavailable_when_cache_and_api_both_fail() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CachedContentProvider::new(dir.path().join("quote.json"));
        let provider = ContentFetcher::new(ScriptedApi::default(), cache);

        assert!(matches!(
            provider.todays_content(now().date_naive()).await,
            Err(ContentError::Unavailable(_))
        ));
    }
}

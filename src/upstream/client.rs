//! The upstream client: filtered, paginated RPC calls with retry, backoff
//! and request-rate limiting.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

use super::api_types::{Page, RpcRequest, RpcResponse};
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;

/// Give up on a paged fetch after this many pages fail in a row. A single
/// bad page is skipped; a wall of failures means the upstream is down.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 10;

pub struct UpstreamClient {
  http: reqwest::Client,
  url: Url,
  api_key: String,
  retry: RetryPolicy,
  limiter: RateLimiter,
  page_size: usize,
  timeout: Duration,
  next_id: AtomicU64,
}

impl UpstreamClient {
  pub fn new(config: &UpstreamConfig, api_key: String) -> Result<Self> {
    let url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid upstream URL {}: {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      url,
      api_key,
      retry: RetryPolicy::new(
        config.max_retries,
        config.retry_delay(),
        config.max_retry_delay(),
      ),
      limiter: RateLimiter::new(config.requests_per_window, config.rate_window()),
      page_size: config.page_size,
      timeout: config.timeout(),
      next_id: AtomicU64::new(1),
    })
  }

  /// Fetch a single page of rows, with rate limiting and retries applied.
  pub async fn fetch_page(
    &self,
    method: &str,
    filters: &[Value],
    first_result: usize,
    page_size: usize,
  ) -> Result<Page, UpstreamError> {
    self
      .retry
      .run(method, || async move {
        self.limiter.acquire().await;
        self.call_once(method, filters, first_result, page_size).await
      })
      .await
  }

  /// Fetch every page of a collection.
  pub async fn fetch_all(&self, method: &str, filters: &[Value]) -> Result<Vec<Value>, UpstreamError> {
    collect_pages(self.page_size, move |first_result| {
      self.fetch_page(method, filters, first_result, self.page_size)
    })
    .await
  }

  /// One raw call, no retries. Classifies transport and protocol failures
  /// into the retryable/non-retryable taxonomy.
  async fn call_once(
    &self,
    method: &str,
    filters: &[Value],
    first_result: usize,
    page_size: usize,
  ) -> Result<Page, UpstreamError> {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let request = RpcRequest::new(method, filters, first_result, page_size, id);

    let response = self
      .http
      .post(self.url.clone())
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(|e| self.classify_transport(e))?;

    let status = response.status();
    if status.as_u16() == 429 {
      let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
      return Err(UpstreamError::RateLimited { retry_after });
    }
    if status.is_server_error() {
      return Err(UpstreamError::Network(format!("HTTP {}", status)));
    }
    if !status.is_success() {
      return Err(UpstreamError::InvalidResponse(format!("HTTP {}", status)));
    }

    let envelope: RpcResponse = response
      .json()
      .await
      .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

    if let Some(error) = envelope.error {
      return Err(UpstreamError::Api {
        code: error.code,
        message: error.message,
      });
    }

    match envelope.result {
      Some(result) => Page::from_result(result),
      None => Err(UpstreamError::InvalidResponse(
        "response carried neither result nor error".to_string(),
      )),
    }
  }

  fn classify_transport(&self, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
      UpstreamError::Timeout(self.timeout)
    } else {
      UpstreamError::Network(err.to_string())
    }
  }
}

/// Walk a paged collection, one `fetch(first_result)` call per page.
///
/// Pages are pulled until one comes back shorter than the page size (or the
/// upstream says there is nothing more). A failed page is skipped without
/// discarding what was already fetched; only a run of
/// [`MAX_CONSECUTIVE_PAGE_FAILURES`] aborts the whole fetch.
async fn collect_pages<F, Fut>(page_size: usize, mut fetch: F) -> Result<Vec<Value>, UpstreamError>
where
  F: FnMut(usize) -> Fut,
  Fut: Future<Output = Result<Page, UpstreamError>>,
{
  let mut rows: Vec<Value> = Vec::new();
  let mut first_result = 0usize;
  let mut consecutive_failures = 0u32;

  loop {
    match fetch(first_result).await {
      Ok(page) => {
        consecutive_failures = 0;
        let fetched = page.rows.len();
        rows.extend(page.rows);
        debug!(first_result, fetched, total = rows.len(), "fetched page");

        let more = page.more.unwrap_or(fetched >= page_size);
        if fetched == 0 || !more {
          break;
        }
        first_result = page
          .next_start
          .map(|s| s as usize)
          .unwrap_or(first_result + page_size);
      }
      Err(err) => {
        consecutive_failures += 1;
        if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
          return Err(err);
        }
        warn!(
          first_result,
          consecutive_failures,
          error = %err,
          "page fetch failed, skipping page"
        );
        first_result += page_size;
      }
    }
  }

  Ok(rows)
}

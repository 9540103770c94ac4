//! Page download: fetch every page image into the request workspace.
//!
//! ## Naming
//!
//! Page `i` is stored as `{i:0w}.jpeg`, where the width `w` is at least 4 and
//! grows with the page count (`0003.jpeg`, or `00003.jpeg` in a manuscript of
//! more than 10 000 pages). Files are named by *source index*, never by
//! arrival order, so the worker pool can finish pages in any order and a
//! lexicographic directory listing still reproduces the manuscript.
//!
//! ## Retry Strategy
//!
//! The IIIF image server sheds load with 503s and occasionally stalls. Each
//! page gets `max_retries` extra attempts with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`): 500 ms → 1 s with the defaults.
//! The delay saturates and never exceeds [`MAX_BACKOFF_MS`], however large
//! the budget.
//! Client errors other than 408/429 are permanent and fail at once.
//!
//! ## Failure
//!
//! The first page to exhaust its budget fails the whole fetch. Dropping the
//! worker stream cancels the requests still in flight; files already written
//! stay in the workspace until its teardown.

use crate::config::PipelineConfig;
use crate::error::Vatlib2PdfError;
use crate::output::PageFile;
use crate::pipeline::manifest::PageImageRef;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Extension of every page file.
pub const PAGE_EXTENSION: &str = "jpeg";

const MIN_INDEX_WIDTH: usize = 4;

/// Upper bound on the pause between two attempts at one page.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Digit width used to name the pages of a manuscript with `total` pages.
pub fn index_width(total: usize) -> usize {
    let last = total.saturating_sub(1);
    let digits = last.checked_ilog10().map_or(1, |d| d as usize + 1);
    digits.max(MIN_INDEX_WIDTH)
}

/// File name for page `index` at the given digit width.
pub fn page_file_name(index: usize, width: usize) -> String {
    format!("{index:0width$}.{PAGE_EXTENSION}")
}

/// Recover the page index from a page file name, or `None` if `name` is not
/// a page file.
pub fn parse_page_index(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(PAGE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Download all `pages` into `dir`.
///
/// # Returns
/// Exactly one [`PageFile`] per input page, ordered by index.
///
/// # Errors
/// [`Vatlib2PdfError::PageFetch`] for the first page that could not be
/// retrieved; no partial list is ever returned.
pub async fn fetch_all(
    client: &reqwest::Client,
    pages: &[PageImageRef],
    dir: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PageFile>, Vatlib2PdfError> {
    let total = pages.len();
    let width = index_width(total);
    let start = Instant::now();
    info!(
        "Fetching {} pages into {} ({} at a time)",
        total,
        dir.display(),
        config.concurrency
    );

    // Each download owns its inputs so the stream stays `Send` when the
    // request runs on a spawned task.
    let shared = Arc::new(config.clone());
    let downloads: Vec<BoxFuture<'static, Result<PageFile, Vatlib2PdfError>>> = pages
        .iter()
        .map(|page| {
            let client = client.clone();
            let config = Arc::clone(&shared);
            let page = page.clone();
            let path = dir.join(page_file_name(page.index, width));
            async move { fetch_page(&client, &page, &path, total, &config).await }.boxed()
        })
        .collect();

    let mut files: Vec<PageFile> = stream::iter(downloads)
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;

    files.sort_by_key(|f| f.index);
    info!(
        "Fetched {} pages in {}ms",
        files.len(),
        start.elapsed().as_millis()
    );
    Ok(files)
}

/// Pause before attempt `attempt + 1`, given `attempt` failures so far.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Why a single attempt failed, and whether another attempt could help.
struct AttemptFailure {
    reason: String,
    retryable: bool,
}

/// Fetch one page with retry, writing it to `path` once complete.
async fn fetch_page(
    client: &reqwest::Client,
    page: &PageImageRef,
    path: &Path,
    total: usize,
    config: &PipelineConfig,
) -> Result<PageFile, Vatlib2PdfError> {
    let url = page.download_url();
    let mut attempt: u32 = 0;

    let bytes = loop {
        if attempt > 0 {
            sleep(backoff_delay(config.retry_backoff_ms, attempt)).await;
        }
        attempt = attempt.saturating_add(1);

        match download_once(client, &url, config).await {
            Ok(bytes) => break bytes,
            Err(f) if f.retryable && attempt <= config.max_retries => {
                warn!(
                    "Page {}: attempt {}/{} failed: {}",
                    page.index,
                    attempt,
                    config.max_retries.saturating_add(1),
                    f.reason
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_retry(page.index, attempt, &f.reason);
                }
            }
            Err(f) => {
                return Err(Vatlib2PdfError::PageFetch {
                    index: page.index,
                    url,
                    attempts: attempt,
                    reason: f.reason,
                })
            }
        }
    };

    // Write beside the target and rename, so a page file only ever exists
    // in complete form.
    let part = path.with_extension(format!("{PAGE_EXTENSION}.part"));
    tokio::fs::write(&part, &bytes)
        .await
        .map_err(|e| Vatlib2PdfError::workspace(&part, e))?;
    tokio::fs::rename(&part, path)
        .await
        .map_err(|e| Vatlib2PdfError::workspace(path, e))?;

    debug!(
        "Page {} → {} ({} bytes, {} attempt(s))",
        page.index,
        path.display(),
        bytes.len(),
        attempt
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_fetched(page.index, total, bytes.len());
    }

    Ok(PageFile {
        index: page.index,
        path: path.to_path_buf(),
    })
}

/// One GET for one page image.
async fn download_once(
    client: &reqwest::Client,
    url: &str,
    config: &PipelineConfig,
) -> Result<Vec<u8>, AttemptFailure> {
    let response = client.get(url).send().await.map_err(|e| AttemptFailure {
        reason: if e.is_timeout() {
            format!("timed out after {}s", config.request_timeout_secs)
        } else {
            e.to_string()
        },
        retryable: true,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptFailure {
            reason: format!("HTTP {status}"),
            retryable: is_retryable_status(status),
        });
    }

    let bytes = response.bytes().await.map_err(|e| AttemptFailure {
        reason: format!("body read failed: {e}"),
        retryable: true,
    })?;

    if bytes.is_empty() {
        return Err(AttemptFailure {
            reason: "empty response body".into(),
            retryable: true,
        });
    }

    Ok(bytes.to_vec())
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

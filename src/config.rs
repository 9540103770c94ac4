//! Configuration types for manuscript downloads and the bot.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The bot transport has its own [`BotConfig`],
//! loaded once at startup and passed by reference into [`crate::bot`]; there
//! is no process-wide token or client.

use crate::error::Vatlib2PdfError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root of the Digital Vatican Library.
pub const DEFAULT_BASE_URL: &str = "https://digi.vatlib.it/";

/// Default upload endpoint for finished documents.
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://transfer.sh";

/// Default Telegram Bot API root.
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Configuration for one manuscript download.
///
/// # Example
/// ```rust
/// use vatlib2pdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(8)
///     .max_retries(2)
///     .work_dir("/var/tmp/vatlib2pdf")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Library root. Links must contain it, and the manifest endpoint is
    /// derived from it. Always ends with `/`. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Number of page images fetched at once. Default: 6.
    ///
    /// The IIIF image server is the bottleneck; more than a handful of
    /// parallel requests per manuscript mostly adds 503s.
    pub concurrency: usize,

    /// Retries per page after the first attempt. Default: 2 (3 attempts).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-HTTP-call timeout in seconds, for the manifest and each page.
    /// Default: 30.
    pub request_timeout_secs: u64,

    /// Directory under which `temp-{requester}` and `PDF-{requester}` are
    /// created. Default: the current directory.
    pub work_dir: PathBuf,

    /// Directory containing the pdfium shared library. When `None`, the
    /// working directory and then the system library path are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: 6,
            max_retries: 2,
            retry_backoff_ms: 500,
            request_timeout_secs: 30,
            work_dir: PathBuf::from("."),
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("work_dir", &self.work_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-call HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the HTTP client shared by the manifest and page stages.
    pub fn http_client(&self) -> Result<reqwest::Client, Vatlib2PdfError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .user_agent(concat!("vatlib2pdf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Vatlib2PdfError::Internal(format!("HTTP client: {e}")))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.config.base_url = url;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Vatlib2PdfError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(Vatlib2PdfError::InvalidConfig(format!(
                "base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if c.concurrency == 0 {
            return Err(Vatlib2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Vatlib2PdfError::InvalidConfig(
                "Request timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Settings for the Telegram transport.
#[derive(Clone)]
pub struct BotConfig {
    /// Bot API token.
    pub token: String,

    /// Bot API root. Default: [`DEFAULT_TELEGRAM_API`].
    pub api_base: String,

    /// Long-poll duration for `getUpdates`, in seconds. Default: 30.
    pub poll_timeout_secs: u64,

    /// Maximum requests processed at once across all requesters. Default: 4.
    pub max_concurrent_requests: usize,

    /// Where finished PDFs are uploaded. Default: [`DEFAULT_UPLOAD_ENDPOINT`].
    pub upload_endpoint: String,

    /// Timeout for one upload, body included, in seconds. Default: 300.
    pub upload_timeout_secs: u64,
}

impl BotConfig {
    /// Create a config with defaults for everything but the token.
    ///
    /// An empty token is rejected here so a misconfigured deployment fails
    /// at startup rather than on the first poll.
    pub fn new(token: impl Into<String>) -> Result<Self, Vatlib2PdfError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Vatlib2PdfError::InvalidConfig(
                "bot token is empty; set TOKEN".into(),
            ));
        }
        Ok(Self {
            token,
            api_base: DEFAULT_TELEGRAM_API.to_string(),
            poll_timeout_secs: 30,
            max_concurrent_requests: 4,
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            upload_timeout_secs: 300,
        })
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .finish()
    }
}

//! Hand-off of the finished PDF.
//!
//! The pipeline only knows the [`Delivery`] trait: give it a path, get back
//! where the document can be retrieved from. The PDF is deleted together with
//! the request workspace right after `deliver` returns, so implementations
//! must copy or upload it before returning.
//!
//! * [`TransferShDelivery`] uploads to a transfer.sh-compatible host
//!   (`PUT /{file name}`, download URL in the response body). The bot uses it.
//! * [`LocalDelivery`] copies the file into a directory. The CLI uses it.

use crate::error::Vatlib2PdfError;
use crate::output::DeliveryReceipt;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Something that can take an assembled document off the pipeline's hands.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver the file at `document`.
    ///
    /// # Errors
    /// [`Vatlib2PdfError::Delivery`] when the document could not be handed off.
    async fn deliver(&self, document: &Path) -> Result<DeliveryReceipt, Vatlib2PdfError>;
}

/// Upload to a transfer.sh-style file host.
#[derive(Debug, Clone)]
pub struct TransferShDelivery {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl TransferShDelivery {
    /// Create an uploader for `endpoint`, e.g. `https://transfer.sh`.
    ///
    /// Uploads of large manuscripts take a while; `timeout` bounds the whole
    /// request including the body upload.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, Vatlib2PdfError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            Vatlib2PdfError::InvalidConfig(format!("upload endpoint '{endpoint}': {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(Vatlib2PdfError::InvalidConfig(format!(
                "upload endpoint '{endpoint}' cannot take a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Vatlib2PdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// Upload URL for a file called `name`; the name is percent-encoded.
    fn upload_url(&self, name: &str) -> reqwest::Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        url
    }
}

#[async_trait]
impl Delivery for TransferShDelivery {
    async fn deliver(&self, document: &Path) -> Result<DeliveryReceipt, Vatlib2PdfError> {
        let fail = |reason: String| Vatlib2PdfError::Delivery { reason };

        let name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| fail(format!("'{}' has no file name", document.display())))?;
        let bytes = tokio::fs::read(document)
            .await
            .map_err(|e| fail(format!("reading '{}': {e}", document.display())))?;

        let url = self.upload_url(&name);
        info!("Uploading {} ({} bytes) to {}", name, bytes.len(), url);

        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("upload answered HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| fail(e.to_string()))?;
        let location = body.trim();
        if location.is_empty() {
            return Err(fail("upload returned an empty body".into()));
        }

        info!("Uploaded {} → {}", name, location);
        Ok(DeliveryReceipt {
            location: location.to_string(),
        })
    }
}

/// Copy the document into a local directory.
#[derive(Debug, Clone)]
pub struct LocalDelivery {
    dir: PathBuf,
}

impl LocalDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Delivery for LocalDelivery {
    async fn deliver(&self, document: &Path) -> Result<DeliveryReceipt, Vatlib2PdfError> {
        let fail = |reason: String| Vatlib2PdfError::Delivery { reason };

        let name = document
            .file_name()
            .ok_or_else(|| fail(format!("'{}' has no file name", document.display())))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fail(format!("creating '{}': {e}", self.dir.display())))?;

        let target = self.dir.join(name);
        tokio::fs::copy(document, &target)
            .await
            .map_err(|e| fail(format!("copying to '{}': {e}", target.display())))?;

        info!("Saved {}", target.display());
        Ok(DeliveryReceipt {
            location: target.to_string_lossy().into_owned(),
        })
    }
}

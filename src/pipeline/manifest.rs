//! Manifest resolution: viewer link → IIIF Presentation manifest → page list.
//!
//! The library publishes one IIIF (v2) manifest per manuscript at
//! `{base}iiif/{id}/manifest.json`. Only two things are read from it: the
//! `label`, and for every canvas of the first sequence the image service id,
//! to which the fixed `/full/full/0/native.jpg` suffix is later appended.
//!
//! Extraction is all-or-nothing. A canvas without an image, or an image
//! without a service id, makes the whole manifest unusable; returning the
//! pages that did parse would silently produce a book with holes in it.

use crate::config::PipelineConfig;
use crate::error::Vatlib2PdfError;
use crate::pipeline::link::ManuscriptLink;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// IIIF Image API request for the full-size native image.
pub const IMAGE_SUFFIX: &str = "/full/full/0/native.jpg";

/// The parts of a manifest the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Display title, e.g. `MSS Vat.lat.3225`.
    pub label: String,
    /// Page image references in canonical order (index 0 is the cover).
    pub pages: Vec<PageImageRef>,
}

/// One page's image service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageImageRef {
    pub index: usize,
    pub service_id: String,
}

impl PageImageRef {
    /// URL of the full-resolution JPEG for this page.
    pub fn download_url(&self) -> String {
        format!("{}{}", self.service_id.trim_end_matches('/'), IMAGE_SUFFIX)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────
// Unknown fields are ignored; missing required ones fail deserialisation.

#[derive(Deserialize)]
struct RawManifest {
    label: String,
    sequences: Vec<RawSequence>,
}

#[derive(Deserialize)]
struct RawSequence {
    canvases: Vec<RawCanvas>,
}

#[derive(Deserialize)]
struct RawCanvas {
    images: Vec<RawImage>,
}

#[derive(Deserialize)]
struct RawImage {
    resource: RawResource,
}

#[derive(Deserialize)]
struct RawResource {
    service: RawService,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(rename = "@id")]
    id: String,
}

/// Manifest endpoint for `link`.
pub fn manifest_url(link: &ManuscriptLink, base_url: &str) -> Result<String, Vatlib2PdfError> {
    let id = link
        .manuscript_id(base_url)
        .ok_or_else(|| Vatlib2PdfError::LinkInvalid {
            input: link.to_string(),
        })?;
    Ok(format!("{base_url}iiif/{id}/manifest.json"))
}

/// Fetch and parse the manifest for `link`.
///
/// One GET, bounded by the client's timeout, no retries.
pub async fn resolve(
    client: &reqwest::Client,
    link: &ManuscriptLink,
    config: &PipelineConfig,
) -> Result<Manifest, Vatlib2PdfError> {
    let url = manifest_url(link, &config.base_url)?;
    info!("Fetching manifest: {}", url);

    let fetch_err = |reason: String| Vatlib2PdfError::ManifestFetch {
        url: url.clone(),
        reason,
    };

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            fetch_err(format!("timed out after {}s", config.request_timeout_secs))
        } else {
            fetch_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let body = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
    debug!("Manifest body: {} bytes", body.len());

    let manifest = parse_manifest(&url, &body)?;
    info!(
        "Manifest '{}' lists {} pages",
        manifest.label,
        manifest.pages.len()
    );
    Ok(manifest)
}

/// Parse a manifest body. `url` is only used for error context.
pub fn parse_manifest(url: &str, body: &str) -> Result<Manifest, Vatlib2PdfError> {
    let parse_err = |detail: String| Vatlib2PdfError::ManifestParse {
        url: url.to_string(),
        detail,
    };

    let raw: RawManifest = serde_json::from_str(body).map_err(|e| parse_err(e.to_string()))?;

    let sequence = raw
        .sequences
        .into_iter()
        .next()
        .ok_or_else(|| parse_err("manifest has no sequences".into()))?;

    let pages = sequence
        .canvases
        .into_iter()
        .enumerate()
        .map(|(index, canvas)| {
            let image = canvas
                .images
                .into_iter()
                .next()
                .ok_or_else(|| parse_err(format!("canvas {index} has no images")))?;
            let service_id = image.resource.service.id;
            if service_id.trim().is_empty() {
                return Err(parse_err(format!("canvas {index} has an empty service id")));
            }
            Ok(PageImageRef { index, service_id })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if pages.is_empty() {
        return Err(parse_err("manifest lists no canvases".into()));
    }

    Ok(Manifest {
        label: raw.label,
        pages,
    })
}

//! End-to-end entry points: link → PDF → delivery.
//!
//! [`download_book`] is the whole request. The workspace is created right
//! after the manifest is resolved and released before the function returns,
//! so page images and the assembled PDF are removed on every exit path. If
//! the calling task is cancelled instead, the workspace's drop guard removes
//! them. Delivery happens inside that scope; a [`Delivery`] implementation
//! must copy or upload the file before returning.

use crate::config::PipelineConfig;
use crate::delivery::{Delivery, LocalDelivery};
use crate::error::Vatlib2PdfError;
use crate::output::{DeliveryReceipt, DownloadOutcome};
use crate::pipeline::link::ManuscriptLink;
use crate::pipeline::manifest::{self, Manifest};
use crate::pipeline::{assemble, fetch};
use crate::workspace::{sanitize_component, RequestWorkspace};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// Download a manuscript, build its PDF, and hand it to `delivery`.
///
/// # Arguments
/// * `link`     : validated viewer link
/// * `requester`: identity used to key the workspace, e.g. a chat user id
/// * `config`   : pipeline configuration
/// * `delivery` : where the finished PDF goes
///
/// # Errors
/// Any stage failure aborts the request. The error is logged here with its
/// stage before being returned.
pub async fn download_book(
    link: &ManuscriptLink,
    requester: &str,
    config: &PipelineConfig,
    delivery: &dyn Delivery,
) -> Result<DownloadOutcome, Vatlib2PdfError> {
    run(link, requester, config, delivery)
        .await
        .inspect_err(|e| {
            error!(
                stage = e.stage(),
                requester,
                link = %link,
                "Request failed: {}",
                e
            );
        })
}

/// Download a manuscript and save its PDF into `destination`.
///
/// Returns the outcome; `receipt.location` is the saved file's path.
pub async fn build_pdf(
    link: &ManuscriptLink,
    requester: &str,
    config: &PipelineConfig,
    destination: &Path,
) -> Result<DownloadOutcome, Vatlib2PdfError> {
    let delivery = LocalDelivery::new(destination);
    download_book(link, requester, config, &delivery).await
}

/// Resolve the manifest for `link` without downloading any page.
pub async fn inspect(
    link: &ManuscriptLink,
    config: &PipelineConfig,
) -> Result<Manifest, Vatlib2PdfError> {
    let client = config.http_client()?;
    manifest::resolve(&client, link, config).await
}

async fn run(
    link: &ManuscriptLink,
    requester: &str,
    config: &PipelineConfig,
    delivery: &dyn Delivery,
) -> Result<DownloadOutcome, Vatlib2PdfError> {
    let total_start = Instant::now();
    info!("Starting request from {}: {}", requester, link);

    // ── Step 1: Resolve manifest ─────────────────────────────────────────
    let client = config.http_client()?;
    let manifest = manifest::resolve(&client, link, config).await?;
    let total_pages = manifest.pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_manifest_resolved(&manifest.label, total_pages);
    }

    // ── Step 2: Acquire workspace ────────────────────────────────────────
    let workspace = RequestWorkspace::acquire(&config.work_dir, requester, &manifest.label).await?;
    let produced = produce(&client, &manifest, &workspace, config, delivery).await;
    workspace.release().await;
    let produced = produced?;

    let total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Request complete: '{}', {} pages, {}ms total → {}",
        manifest.label, produced.page_count, total_duration_ms, produced.receipt.location
    );

    Ok(DownloadOutcome {
        label: manifest.label,
        page_count: produced.page_count,
        receipt: produced.receipt,
        fetch_duration_ms: produced.fetch_duration_ms,
        assembly_duration_ms: produced.assembly_duration_ms,
        total_duration_ms,
    })
}

/// What the workspace-bound steps hand back to [`run`].
struct Produced {
    page_count: usize,
    receipt: DeliveryReceipt,
    fetch_duration_ms: u64,
    assembly_duration_ms: u64,
}

/// Steps 3 to 5, all inside `workspace`.
async fn produce(
    client: &reqwest::Client,
    manifest: &Manifest,
    workspace: &RequestWorkspace,
    config: &PipelineConfig,
    delivery: &dyn Delivery,
) -> Result<Produced, Vatlib2PdfError> {
    // ── Step 3: Fetch pages ──────────────────────────────────────────────
    let fetch_start = Instant::now();
    let files = fetch::fetch_all(client, &manifest.pages, workspace.pages_dir(), config).await?;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

    // ── Step 4: Assemble PDF ─────────────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_start(files.len());
    }
    let assembly_start = Instant::now();
    let document = assemble::assemble(
        workspace.pages_dir(),
        &sanitize_component(&manifest.label),
        workspace.output_dir(),
        config.pdfium_lib_path.as_deref(),
    )
    .await?;
    let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_complete(document.page_count);
    }

    // ── Step 5: Deliver ──────────────────────────────────────────────────
    let receipt = delivery.deliver(&document.path).await?;

    Ok(Produced {
        page_count: document.page_count,
        receipt,
        fetch_duration_ms,
        assembly_duration_ms,
    })
}

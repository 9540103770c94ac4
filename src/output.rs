//! Result types produced by the pipeline stages.

use serde::Serialize;
use std::path::PathBuf;

/// One fetched page image on disk.
///
/// The file name encodes `index` zero-padded (see
/// [`crate::pipeline::fetch::page_file_name`]), so sorting page files by name
/// reproduces manuscript order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFile {
    /// 0-based page index in the manuscript.
    pub index: usize,
    /// Location inside the request workspace.
    pub path: PathBuf,
}

/// The assembled PDF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDocument {
    pub path: PathBuf,
    pub page_count: usize,
    /// Page width in points, equal to the first image's pixel width.
    pub page_width_pt: f32,
    /// Page height in points, equal to the first image's pixel height.
    pub page_height_pt: f32,
}

/// Where a delivered document can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// A download URL, or a local path for [`crate::delivery::LocalDelivery`].
    pub location: String,
}

/// Summary of a completed request.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub label: String,
    pub page_count: usize,
    pub receipt: DeliveryReceipt,
    pub fetch_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

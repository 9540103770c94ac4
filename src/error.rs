//! Error types for the vatlib2pdf library.
//!
//! Every failure in the pipeline is fatal for the request it belongs to: a
//! manuscript with one missing page is not worth delivering, so there is no
//! per-page "partial success" type. What callers do need is to tell the two
//! audiences apart:
//!
//! * the **requester** only ever sees whether their link was usable
//!   ([`Vatlib2PdfError::is_user_correctable`]); everything else collapses
//!   into one generic failure message;
//! * the **operator** gets the full variant, including the pipeline
//!   [`stage`](Vatlib2PdfError::stage) and the identifying detail (URL, page
//!   index, path) needed to diagnose it from the logs.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the vatlib2pdf library.
#[derive(Debug, Error)]
pub enum Vatlib2PdfError {
    // ── Link errors ───────────────────────────────────────────────────────
    /// The input text does not contain a usable manuscript link.
    #[error("The message does not contain any valid link.")]
    LinkInvalid { input: String },

    // ── Manifest errors ───────────────────────────────────────────────────
    /// The manifest endpoint could not be reached, timed out, or answered
    /// with a non-success status.
    #[error("Failed to fetch manifest '{url}': {reason}")]
    ManifestFetch { url: String, reason: String },

    /// The manifest body is not the expected IIIF structure.
    #[error("Malformed manifest '{url}': {detail}")]
    ManifestParse { url: String, detail: String },

    // ── Page errors ───────────────────────────────────────────────────────
    /// One page could not be retrieved after exhausting its retry budget.
    #[error("Page {index} could not be downloaded from '{url}' after {attempts} attempt(s): {reason}")]
    PageFetch {
        index: usize,
        url: String,
        attempts: u32,
        reason: String,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The workspace holds no page files, so there is nothing to assemble.
    #[error("No page images found in '{dir}'")]
    EmptyWorkspace { dir: PathBuf },

    /// A page file exists but is not a decodable image.
    #[error("Page image '{path}' could not be decoded: {detail}")]
    UndecodableImage { path: PathBuf, detail: String },

    /// pdfium refused to build or save the document.
    #[error("PDF assembly failed: {detail}")]
    AssemblyFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Delivery errors ───────────────────────────────────────────────────
    /// Upload or hand-off of the finished document failed.
    #[error("Delivery failed: {reason}")]
    Delivery { reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Creating, writing, or reading a workspace path failed.
    #[error("Workspace I/O error on '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The chat transport (Telegram Bot API) failed.
    #[error("Bot transport error: {reason}")]
    Transport { reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Vatlib2PdfError {
    /// The pipeline stage this error originated from, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::LinkInvalid { .. } => "validate",
            Self::ManifestFetch { .. } | Self::ManifestParse { .. } => "manifest",
            Self::PageFetch { .. } => "fetch",
            Self::EmptyWorkspace { .. }
            | Self::UndecodableImage { .. }
            | Self::AssemblyFailed { .. }
            | Self::PdfiumBindingFailed(_) => "assemble",
            Self::Delivery { .. } => "deliver",
            Self::Workspace { .. } => "workspace",
            Self::Transport { .. } => "transport",
            Self::InvalidConfig(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the requester can fix this by sending a different message.
    ///
    /// Only link errors qualify; their display text is shown verbatim.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::LinkInvalid { .. })
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_invalid_display_is_user_facing() {
        let e = Vatlib2PdfError::LinkInvalid {
            input: "hello".into(),
        };
        assert_eq!(e.to_string(), "The message does not contain any valid link.");
        assert!(e.is_user_correctable());
        assert_eq!(e.stage(), "validate");
    }

    #[test]
    fn page_fetch_display_names_index() {
        let e = Vatlib2PdfError::PageFetch {
            index: 2,
            url: "https://example.org/iiif/p2/full/full/0/native.jpg".into(),
            attempts: 3,
            reason: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"), "got: {msg}");
        assert!(msg.contains("3 attempt"), "got: {msg}");
        assert!(!e.is_user_correctable());
        assert_eq!(e.stage(), "fetch");
    }

    #[test]
    fn assembly_errors_share_a_stage() {
        let empty = Vatlib2PdfError::EmptyWorkspace { dir: "x".into() };
        let bad = Vatlib2PdfError::UndecodableImage {
            path: "x/0000.jpeg".into(),
            detail: "truncated".into(),
        };
        assert_eq!(empty.stage(), "assemble");
        assert_eq!(bad.stage(), "assemble");
    }

    #[test]
    fn workspace_error_keeps_source() {
        use std::error::Error as _;
        let e = Vatlib2PdfError::workspace(
            "temp-1",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(e.source().is_some());
        assert!(e.to_string().contains("temp-1"));
    }
}

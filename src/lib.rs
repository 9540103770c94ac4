//! # vatlib2pdf
//!
//! Turn a digitised manuscript from the Digital Vatican Library
//! (<https://digi.vatlib.it/>) into a single PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! viewer link
//!  │
//!  ├─ 1. Link      find the library link in the message text
//!  ├─ 2. Manifest  GET {base}iiif/{id}/manifest.json → label + page list
//!  ├─ 3. Fetch     concurrent page downloads with retry, 0000.jpeg, 0001.jpeg, …
//!  ├─ 4. Assemble  one PDF page per image, sized from the first image (pdfium)
//!  └─ 5. Deliver   upload (bot) or copy to a directory (CLI)
//! ```
//!
//! Steps 3 to 5 run inside a per-request workspace that is deleted when the
//! request ends, however it ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vatlib2pdf::{build_pdf, validate, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let link = validate(
//!         "https://digi.vatlib.it/view/MSS_Vat.lat.3225",
//!         &config.base_url,
//!     )?;
//!     let outcome = build_pdf(&link, "local", &config, "books".as_ref()).await?;
//!     println!("{} pages → {}", outcome.page_count, outcome.receipt.location);
//!     Ok(())
//! }
//! ```
//!
//! PDF assembly needs the pdfium shared library at runtime; point
//! [`PipelineConfig::pdfium_lib_path`] (or `PDFIUM_LIB_PATH` for the CLI) at
//! the directory containing it.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `vatlib2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! vatlib2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bot;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod telegram;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BotConfig, PipelineConfig, PipelineConfigBuilder};
pub use convert::{build_pdf, download_book, inspect};
pub use delivery::{Delivery, LocalDelivery, TransferShDelivery};
pub use error::Vatlib2PdfError;
pub use output::{DeliveryReceipt, DownloadOutcome, OutputDocument, PageFile};
pub use pipeline::link::{validate, ManuscriptLink};
pub use pipeline::manifest::{Manifest, PageImageRef};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use workspace::RequestWorkspace;

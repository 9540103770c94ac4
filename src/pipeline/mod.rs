//! Pipeline stages for manuscript-to-PDF conversion.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! link ──▶ manifest ──▶ fetch ──▶ assemble
//! (text)    (IIIF JSON)  (JPEGs)   (pdfium)
//! ```
//!
//! 1. [`link`]    : find the manuscript link in free-form message text
//! 2. [`manifest`]: fetch the IIIF manifest and extract label + page list
//! 3. [`fetch`]   : download every page image with bounded concurrency
//!    and per-page retry; files are named by page index
//! 4. [`assemble`]: build one PDF page per image; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//!
//! The request workspace that [`fetch`] writes into and [`assemble`] reads
//! from lives in [`crate::workspace`].

pub mod assemble;
pub mod fetch;
pub mod link;
pub mod manifest;

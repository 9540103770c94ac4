//! Per-request scratch storage with guaranteed teardown.
//!
//! A request owns three directories under the configured working directory:
//!
//! ```text
//! temp-{requester}/            root
//! temp-{requester}/{label}/    page images (PageFetcher → DocumentAssembler)
//! PDF-{requester}/             assembled document awaiting delivery
//! ```
//!
//! Both top-level directories are held by a [`ScopedDir`] guard. A request
//! that runs to completion, successfully or not, calls
//! [`RequestWorkspace::release`], which deletes the tree on Tokio's blocking
//! pool and waits for it. If the request never gets there (panic unwinding,
//! an aborted task, a half-created workspace) the guard's `Drop` removes the
//! directories synchronously instead.
//!
//! Directory names are keyed by requester only. Two overlapping requests from
//! the same requester would share them; [`crate::bot`] rejects the second
//! request instead.

use crate::error::Vatlib2PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1F\x7F]"#).unwrap());

/// Make `raw` usable as a single path component.
///
/// Path separators, characters Windows forbids, and control characters
/// become `_`. Names that would still escape or vanish (`.`, `..`, empty)
/// are replaced with `_`.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned = UNSAFE_PATH_CHARS.replace_all(raw.trim(), "_");
    match cleaned.as_ref() {
        "" | "." | ".." => "_".to_string(),
        s => s.to_string(),
    }
}

/// A directory that is removed, with everything in it, when dropped.
#[derive(Debug)]
pub struct ScopedDir {
    path: PathBuf,
    armed: bool,
}

impl ScopedDir {
    /// Create `path` (and missing parents). An existing directory, e.g. left
    /// behind by a crashed run, is reused as is.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, Vatlib2PdfError> {
        // Guard first, so a half-created tree is still removed.
        let dir = Self {
            path: path.into(),
            armed: true,
        };
        tokio::fs::create_dir_all(&dir.path)
            .await
            .map_err(|e| Vatlib2PdfError::workspace(&dir.path, e))?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory on the blocking pool and wait until it is gone.
    pub async fn remove(mut self) {
        self.armed = false;
        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::task::spawn_blocking(move || remove_tree(&path)).await {
            warn!("Directory removal task failed: {}", e);
        }
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if self.armed {
            remove_tree(&self.path);
        }
    }
}

fn remove_tree(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Scratch storage for one request. Releasing or dropping it deletes
/// everything.
#[derive(Debug)]
pub struct RequestWorkspace {
    root: ScopedDir,
    output: ScopedDir,
    pages_dir: PathBuf,
}

impl RequestWorkspace {
    /// Create the workspace for `requester` working on manuscript `label`.
    ///
    /// Idempotent: existing directories are reused.
    pub async fn acquire(
        work_dir: &Path,
        requester: &str,
        label: &str,
    ) -> Result<Self, Vatlib2PdfError> {
        let requester = sanitize_component(requester);
        let root = ScopedDir::create(work_dir.join(format!("temp-{requester}"))).await?;
        let output = ScopedDir::create(work_dir.join(format!("PDF-{requester}"))).await?;

        let pages_dir = root.path().join(sanitize_component(label));
        tokio::fs::create_dir_all(&pages_dir)
            .await
            .map_err(|e| Vatlib2PdfError::workspace(&pages_dir, e))?;

        debug!("Workspace ready: {}", pages_dir.display());
        Ok(Self {
            root,
            output,
            pages_dir,
        })
    }

    /// Per-requester root, `temp-{requester}`.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Manuscript subdirectory holding page images.
    pub fn pages_dir(&self) -> &Path {
        &self.pages_dir
    }

    /// Directory the assembled PDF is written to, `PDF-{requester}`.
    pub fn output_dir(&self) -> &Path {
        self.output.path()
    }

    /// Delete both directories off the async workers. Both are gone when
    /// this returns.
    pub async fn release(self) {
        let Self { root, output, .. } = self;
        root.remove().await;
        output.remove().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_spaces_and_dots() {
        assert_eq!(sanitize_component("MSS Vat.lat.3225"), "MSS Vat.lat.3225");
        assert_eq!(sanitize_component("123456789"), "123456789");
    }

    #[test]
    fn separators_and_control_chars_are_replaced() {
        assert_eq!(sanitize_component("Barb.lat/4426"), "Barb.lat_4426");
        assert_eq!(sanitize_component(r"a\b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_component("tab\there"), "tab_here");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("   "), "_");
    }

    #[tokio::test]
    async fn acquire_creates_expected_layout() {
        let base = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::acquire(base.path(), "42", "MSS Vat.lat.3225")
            .await
            .unwrap();

        assert_eq!(ws.root(), base.path().join("temp-42"));
        assert_eq!(ws.pages_dir(), base.path().join("temp-42").join("MSS Vat.lat.3225"));
        assert_eq!(ws.output_dir(), base.path().join("PDF-42"));
        assert!(ws.pages_dir().is_dir());
        assert!(ws.output_dir().is_dir());
    }

    #[tokio::test]
    async fn drop_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::acquire(base.path(), "7", "book").await.unwrap();
        std::fs::write(ws.pages_dir().join("0000.jpeg"), b"x").unwrap();
        std::fs::write(ws.output_dir().join("book.pdf"), b"%PDF").unwrap();

        drop(ws);

        assert!(!base.path().join("temp-7").exists());
        assert!(!base.path().join("PDF-7").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn release_removes_everything_before_returning() {
        let base = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::acquire(base.path(), "8", "book").await.unwrap();
        for i in 0..50 {
            std::fs::write(ws.pages_dir().join(format!("{i:04}.jpeg")), b"x").unwrap();
        }
        std::fs::write(ws.output_dir().join("book.pdf"), b"%PDF").unwrap();

        ws.release().await;

        assert!(!base.path().join("temp-8").exists());
        assert!(!base.path().join("PDF-8").exists());
    }

    #[tokio::test]
    async fn remove_works_on_a_single_threaded_runtime() {
        let base = tempfile::tempdir().unwrap();
        let path = base.path().join("scoped").join("nested");
        let dir = ScopedDir::create(&path).await.unwrap();
        std::fs::write(path.join("page"), b"x").unwrap();

        dir.remove().await;
        assert!(!path.exists());
        assert!(base.path().join("scoped").exists());
    }

    #[tokio::test]
    async fn acquire_is_idempotent_over_leftovers() {
        let base = tempfile::tempdir().unwrap();
        let stale = base.path().join("temp-9").join("book");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("0000.jpeg"), b"old").unwrap();

        let ws = RequestWorkspace::acquire(base.path(), "9", "book").await.unwrap();
        assert!(ws.pages_dir().join("0000.jpeg").exists());
        drop(ws);
        assert!(!base.path().join("temp-9").exists());
    }

    #[tokio::test]
    async fn teardown_tolerates_already_removed_dirs() {
        let base = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::acquire(base.path(), "5", "book").await.unwrap();
        std::fs::remove_dir_all(ws.root()).unwrap();
        drop(ws);
        assert!(!base.path().join("PDF-5").exists());
    }

    #[tokio::test]
    async fn requester_cannot_escape_work_dir() {
        let base = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::acquire(base.path(), "../evil", "book")
            .await
            .unwrap();
        assert!(ws.root().starts_with(base.path()));
        assert_eq!(ws.root(), base.path().join("temp-.._evil"));
    }

    #[tokio::test]
    async fn aborted_task_still_tears_down() {
        let base = tempfile::tempdir().unwrap();
        let work_dir = base.path().to_path_buf();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            let _ws = RequestWorkspace::acquire(&work_dir, "3", "book").await.unwrap();
            let _ = ready_tx.send(());
            std::future::pending::<()>().await;
        });

        ready_rx.await.unwrap();
        assert!(base.path().join("temp-3").exists());
        task.abort();
        let _ = task.await;
        assert!(!base.path().join("temp-3").exists());
        assert!(!base.path().join("PDF-3").exists());
    }
}

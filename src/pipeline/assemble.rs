//! PDF assembly: page images on disk → one PDF, one page per image.
//!
//! ## Page order
//!
//! Page files are sorted by file name, never taken in directory-listing
//! order. The zero-padded naming from [`crate::pipeline::fetch`] makes that
//! the manuscript order.
//!
//! ## Page size
//!
//! The first page image's header gives its pixel size, and every PDF page
//! is that many points wide and high. Each image is stretched to fill its
//! page, so a manuscript whose plates differ in size shows the later ones
//! slightly distorted; sizing per page is not done.
//!
//! ## Image data
//!
//! Pages must be JPEG, recognised by content rather than by file name. The
//! JPEG bytes are embedded as they are: pixels are never decoded, so only
//! one page's file is held at a time and the PDF carries the original
//! compression.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and blocking file I/O.
//! Building the document runs on the blocking pool so the Tokio workers stay
//! free for other requests' downloads.

use crate::error::Vatlib2PdfError;
use crate::output::{OutputDocument, PageFile};
use crate::pipeline::fetch::parse_page_index;
use image::{ImageFormat, ImageReader};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything needed to write the PDF, worked out before pdfium is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyPlan {
    /// Page files sorted by name.
    pub pages: Vec<PageFile>,
    pub width_px: u32,
    pub height_px: u32,
}

/// List the page files in `dir`, sorted lexicographically by file name.
///
/// Only regular files whose name parses as a page index are included, so
/// in-progress `.part` files and anything else in the directory are skipped.
pub fn list_page_files(dir: &Path) -> Result<Vec<PageFile>, Vatlib2PdfError> {
    let entries = std::fs::read_dir(dir).map_err(|e| Vatlib2PdfError::workspace(dir, e))?;

    let mut named = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Vatlib2PdfError::workspace(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| Vatlib2PdfError::workspace(entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(index) = parse_page_index(&name) {
            named.push((name, PageFile {
                index,
                path: entry.path(),
            }));
        }
    }

    named.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(named.into_iter().map(|(_, page)| page).collect())
}

/// Pixel dimensions of a JPEG page file, read from its header.
///
/// The format is sniffed from the content. Anything other than a JPEG with a
/// readable header is [`Vatlib2PdfError::UndecodableImage`].
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), Vatlib2PdfError> {
    let undecodable = |detail: String| Vatlib2PdfError::UndecodableImage {
        path: path.to_path_buf(),
        detail,
    };
    let reader = ImageReader::open(path)
        .map_err(|e| Vatlib2PdfError::workspace(path, e))?
        .with_guessed_format()
        .map_err(|e| undecodable(e.to_string()))?;
    match reader.format() {
        Some(ImageFormat::Jpeg) => {}
        Some(other) => return Err(undecodable(format!("expected JPEG, found {other:?}"))),
        None => return Err(undecodable("unrecognised image format".into())),
    }
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| undecodable(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(undecodable(format!("image has zero size ({width}x{height})")));
    }
    Ok((width, height))
}

/// Work out page order and page size for the images in `dir`.
///
/// # Errors
/// * [`Vatlib2PdfError::EmptyWorkspace`] when `dir` holds no page files
/// * [`Vatlib2PdfError::UndecodableImage`] when the first page is not a JPEG
pub fn plan(dir: &Path) -> Result<AssemblyPlan, Vatlib2PdfError> {
    let pages = list_page_files(dir)?;
    let first = pages.first().ok_or_else(|| Vatlib2PdfError::EmptyWorkspace {
        dir: dir.to_path_buf(),
    })?;

    let (width_px, height_px) = image_dimensions(&first.path)?;
    debug!(
        "Page size from {}: {}x{} px",
        first.path.display(),
        width_px,
        height_px
    );

    Ok(AssemblyPlan {
        pages,
        width_px,
        height_px,
    })
}

/// Assemble the page images in `pages_dir` into `{output_dir}/{file_stem}.pdf`.
///
/// Nothing is written when planning fails. The PDF is saved under a `.part`
/// name and renamed once complete, so a failed run leaves no document.
pub async fn assemble(
    pages_dir: &Path,
    file_stem: &str,
    output_dir: &Path,
    pdfium_lib_path: Option<&Path>,
) -> Result<OutputDocument, Vatlib2PdfError> {
    let plan = plan(pages_dir)?;
    info!(
        "Assembling {} pages at {}x{} pt",
        plan.pages.len(),
        plan.width_px,
        plan.height_px
    );

    let out_path = output_dir.join(format!("{file_stem}.pdf"));
    let lib_path = pdfium_lib_path.map(Path::to_path_buf);

    let target = out_path.clone();
    let document = tokio::task::spawn_blocking(move || {
        write_pdf_blocking(&plan, &target, lib_path.as_deref())
    })
    .await
    .map_err(|e| Vatlib2PdfError::Internal(format!("Assembly task panicked: {}", e)))??;

    info!(
        "Wrote {} ({} pages)",
        out_path.display(),
        document.page_count
    );
    Ok(document)
}

/// Bind pdfium from `lib_dir`, or else the working directory, or else the
/// system library path.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, Vatlib2PdfError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Vatlib2PdfError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF writing.
fn write_pdf_blocking(
    plan: &AssemblyPlan,
    out_path: &Path,
    lib_dir: Option<&Path>,
) -> Result<OutputDocument, Vatlib2PdfError> {
    let pdfium = bind_pdfium(lib_dir)?;
    let failed = |what: &str, e: PdfiumError| Vatlib2PdfError::AssemblyFailed {
        detail: format!("{what}: {e:?}"),
    };

    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| failed("create document", e))?;

    let width = PdfPoints::new(plan.width_px as f32);
    let height = PdfPoints::new(plan.height_px as f32);

    for page_file in &plan.pages {
        let (px_width, px_height) = image_dimensions(&page_file.path)?;

        let mut image = PdfPageImageObject::new_from_jpeg_file(&document, &page_file.path)
            .map_err(|e| Vatlib2PdfError::UndecodableImage {
                path: page_file.path.clone(),
                detail: format!("{e:?}"),
            })?;
        // A fresh image object is 1x1 pt; scaling stretches it over the page.
        image
            .scale(width.value, height.value)
            .map_err(|e| failed("scale image", e))?;

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(|e| failed("add page", e))?;
        page.objects_mut()
            .add_image_object(image)
            .map_err(|e| failed("place image", e))?;

        debug!(
            "Page {} ← {} ({}x{} px)",
            page_file.index,
            page_file.path.display(),
            px_width,
            px_height
        );
    }

    let part_path = partial_path(out_path);
    let saved = document.save_to_file(&part_path);
    if let Err(e) = saved {
        let _ = std::fs::remove_file(&part_path);
        return Err(failed("save document", e));
    }
    std::fs::rename(&part_path, out_path).map_err(|e| Vatlib2PdfError::workspace(out_path, e))?;

    Ok(OutputDocument {
        path: out_path.to_path_buf(),
        page_count: plan.pages.len(),
        page_width_pt: width.value,
        page_height_pt: height.value,
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 160, 120])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encoded(width, height, ImageFormat::Jpeg)
    }

    /// pdfium is a runtime dependency; tests that need it skip when it
    /// cannot be bound.
    fn pdfium_or_skip() -> Option<Pdfium> {
        let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
        match bind_pdfium(lib.as_deref()) {
            Ok(p) => Some(p),
            Err(e) => {
                println!("SKIP: pdfium not available: {e}");
                None
            }
        }
    }

    #[test]
    fn listing_sorts_by_name_not_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002.jpeg", "0000.jpeg", "0010.jpeg", "0001.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pages = list_page_files(dir.path()).unwrap();
        let indices: Vec<_> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[test]
    fn listing_skips_partial_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0000.jpeg"), b"x").unwrap();
        std::fs::write(dir.path().join("0001.jpeg.part"), b"x").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("0002.jpeg")).unwrap();

        let pages = list_page_files(dir.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 0);
    }

    #[test]
    fn plan_takes_size_from_first_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.jpeg"), jpeg(30, 20)).unwrap();
        std::fs::write(dir.path().join("0000.jpeg"), jpeg(64, 48)).unwrap();

        let plan = plan(dir.path()).unwrap();
        assert_eq!((plan.width_px, plan.height_px), (64, 48));
        assert_eq!(plan.pages.len(), 2);
    }

    #[test]
    fn plan_rejects_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(dir.path()).unwrap_err();
        assert!(matches!(err, Vatlib2PdfError::EmptyWorkspace { .. }));
    }

    #[test]
    fn plan_rejects_undecodable_first_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0000.jpeg"), b"<html>503</html>").unwrap();
        let err = plan(dir.path()).unwrap_err();
        assert!(matches!(err, Vatlib2PdfError::UndecodableImage { .. }));
        assert_eq!(err.stage(), "assemble");
    }

    #[test]
    fn plan_rejects_non_jpeg_first_page_named_like_a_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0000.jpeg"), encoded(20, 20, ImageFormat::Png)).unwrap();
        std::fs::write(dir.path().join("0001.jpeg"), jpeg(20, 20)).unwrap();

        let err = plan(dir.path()).unwrap_err();
        match err {
            Vatlib2PdfError::UndecodableImage { path, detail } => {
                assert_eq!(path, dir.path().join("0000.jpeg"));
                assert!(detail.contains("Png"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dimensions_come_from_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0000.png");
        std::fs::write(&path, jpeg(33, 17)).unwrap();
        assert_eq!(image_dimensions(&path).unwrap(), (33, 17));
    }

    #[tokio::test]
    async fn assemble_on_empty_workspace_writes_nothing() {
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = assemble(pages.path(), "book", out.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Vatlib2PdfError::EmptyWorkspace { .. }));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/x/MSS Vat.lat.3225.pdf")),
            PathBuf::from("/x/MSS Vat.lat.3225.pdf.part")
        );
    }

    #[tokio::test]
    async fn every_page_has_the_first_image_size() {
        if pdfium_or_skip().is_none() {
            return;
        }
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // Later plates differ in size and are stretched to the first.
        let sizes = [(120, 180), (60, 40), (240, 360)];
        for (i, (w, h)) in sizes.iter().enumerate() {
            std::fs::write(pages.path().join(format!("000{i}.jpeg")), jpeg(*w, *h)).unwrap();
        }

        let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
        let doc = assemble(pages.path(), "MSS Vat.lat.3225", out.path(), lib.as_deref())
            .await
            .unwrap();
        assert_eq!(doc.path, out.path().join("MSS Vat.lat.3225.pdf"));
        assert_eq!(doc.page_count, 3);
        assert_eq!((doc.page_width_pt, doc.page_height_pt), (120.0, 180.0));

        let close = |a: f32, b: f32| (a - b).abs() < 0.01;
        let pdfium = bind_pdfium(lib.as_deref()).unwrap();
        let pdf = pdfium.load_pdf_from_file(&doc.path, None).unwrap();
        assert_eq!(pdf.pages().len(), 3);
        for page in pdf.pages().iter() {
            assert!(close(page.width().value, 120.0));
            assert!(close(page.height().value, 180.0));
            assert_eq!(page.objects().len(), 1);

            let object = page.objects().iter().next().unwrap();
            assert!(object.as_image_object().is_some());
            let bounds = object.bounds().unwrap();
            assert!(close(bounds.left().value, 0.0), "left {}", bounds.left().value);
            assert!(close(bounds.bottom().value, 0.0), "bottom {}", bounds.bottom().value);
            assert!(close(bounds.right().value, 120.0), "right {}", bounds.right().value);
            assert!(close(bounds.top().value, 180.0), "top {}", bounds.top().value);
        }
    }

    #[tokio::test]
    async fn undecodable_later_page_leaves_no_document() {
        if pdfium_or_skip().is_none() {
            return;
        }
        let pages = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(pages.path().join("0000.jpeg"), jpeg(40, 40)).unwrap();
        std::fs::write(pages.path().join("0001.jpeg"), b"not an image").unwrap();

        let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
        let err = assemble(pages.path(), "book", out.path(), lib.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, Vatlib2PdfError::UndecodableImage { .. }));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}

//! PDF pages: embedded text first, rasterise only the sparse pages.
//!
//! Most PDFs carry a text layer that is both exact and free to read. Only
//! pages whose text layer is missing or nearly empty (scans, image-only
//! slides) are rendered to a bitmap for recognition.
//!
//! pdfium is not async-safe and rendering is CPU-bound; callers run
//! [`PageSource::extract`] inside `spawn_blocking`.

use crate::config::HandlerConfig;
use crate::error::HandlerError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How pages are classified and rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    /// Pages with fewer trimmed characters than this are rasterised.
    pub min_text_chars: usize,
    /// Scale applied to the page's natural size when rasterising.
    pub render_scale: f32,
    /// Cap on either edge of a rendered bitmap.
    pub max_rendered_pixels: u32,
}

impl PagePlan {
    pub fn from_config(config: &HandlerConfig) -> Self {
        Self {
            min_text_chars: config.min_page_text_chars,
            render_scale: config.render_scale,
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }

    /// True when `text` is too short to be used directly.
    pub fn is_sparse(&self, text: &str) -> bool {
        text.trim().chars().count() < self.min_text_chars
    }
}

/// One page of a document.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// 1-indexed page number.
    pub number: usize,
    /// Embedded text layer (may be empty).
    pub text: String,
    /// Rendered bitmap; present iff the text layer is sparse.
    pub raster: Option<DynamicImage>,
}

/// Something that can split a PDF into [`PdfPage`]s.
pub trait PageSource: Send + Sync {
    /// Blocking. Pages are returned in ascending page order.
    fn extract(&self, pdf: Vec<u8>, plan: &PagePlan) -> Result<Vec<PdfPage>, HandlerError>;
}

/// [`PageSource`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumPageSource {
    /// Library file or directory; None binds the system library.
    lib_path: Option<PathBuf>,
}

impl PdfiumPageSource {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    fn bind(&self) -> Result<Pdfium, HandlerError> {
        let bindings = match self.lib_path {
            Some(ref p) => Pdfium::bind_to_library(library_file(p)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| HandlerError::PdfOpen {
            detail: format!("cannot bind pdfium library: {e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

/// Resolve a configured pdfium path: a directory gets the platform file name.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl PageSource for PdfiumPageSource {
    fn extract(&self, pdf: Vec<u8>, plan: &PagePlan) -> Result<Vec<PdfPage>, HandlerError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_vec(pdf, None)
            .map_err(|e| HandlerError::PdfOpen {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(HandlerError::EmptyPdf);
        }
        info!("PDF loaded: {} pages", total);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(plan.render_scale)
            .set_maximum_width(plan.max_rendered_pixels as i32)
            .set_maximum_height(plan.max_rendered_pixels as i32);

        let mut out = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let number = idx + 1;
            let text = page
                .text()
                .map_err(|e| HandlerError::PdfRender {
                    page: number,
                    detail: format!("text extraction failed: {e:?}"),
                })?
                .all();

            let raster = if plan.is_sparse(&text) {
                let bitmap = page.render_with_config(&render_config).map_err(|e| {
                    HandlerError::PdfRender {
                        page: number,
                        detail: format!("rasterisation failed: {e:?}"),
                    }
                })?;
                let image = bitmap.as_image();
                debug!(
                    "Page {}: {} chars embedded, rendered {}x{} px",
                    number,
                    text.trim().chars().count(),
                    image.width(),
                    image.height()
                );
                Some(image)
            } else {
                debug!("Page {}: using {} embedded chars", number, text.chars().count());
                None
            };

            out.push(PdfPage { number, text, raster });
        }

        Ok(out)
    }
}

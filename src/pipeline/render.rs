//! Window page rendering and merging via pdfium.
//!
//! The final address is printed on a fresh A4 page at the position of a
//! window envelope's window, and that page is appended after the source
//! document's pages. Geometry is configured in millimetres from the top-right
//! corner of the page, because that is how envelope windows are specified;
//! pdfium works in points from the bottom-left corner.
//!
//! ```text
//!  ┌──────────────────────────────┐ ▲
//!  │               margin_top     │ │
//!  │          ┌─────────width────┐│ │ 297 mm
//!  │          │ line 0 baseline  ││ │
//!  │          │ line 1 ...       ├┤◀┼─ margin_right
//!  │          └──────────────────┘│ │
//!  └──────────────────────────────┘ ▼
//! ```

use crate::config::{DisplayConfig, EnvelopeConfig, FontConfig};
use crate::error::EnvelopeError;
use crate::pipeline::correct::FinalAddress;
use pdfium_render::prelude::*;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Millimetres to PDF points.
pub const MM_TO_PT: f32 = 2.83465;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;

/// Light gray, 0.7 pt.
const BORDER_GRAY: u8 = 204;
const BORDER_WIDTH_PT: f32 = 0.7;

/// Window position on the page, in points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowGeometry {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub line_height: f32,
}

impl WindowGeometry {
    pub fn from_display(display: &DisplayConfig) -> Self {
        let left_mm = PAGE_WIDTH_MM - display.margin_right - display.width;
        let top_mm = PAGE_HEIGHT_MM - display.margin_top;
        Self {
            left: left_mm * MM_TO_PT,
            top: top_mm * MM_TO_PT,
            width: display.width * MM_TO_PT,
            line_height: display.line_height,
        }
    }

    /// Baseline of the `index`-th line. The first baseline is the window top.
    pub fn baseline(&self, index: usize) -> f32 {
        self.top - index as f32 * self.line_height
    }

    /// Frame around `line_count` lines, hanging down from the window top.
    pub fn border(&self, line_count: usize) -> PdfRect {
        let height = line_count as f32 * self.line_height;
        PdfRect::new_from_values(
            self.top - height,
            self.left,
            self.top,
            self.left + self.width,
        )
    }
}

fn render_err(what: &str, e: PdfiumError) -> EnvelopeError {
    EnvelopeError::Render(format!("{}: {:?}", what, e))
}

/// Standard PDF font matching `name`, Helvetica when unknown.
fn builtin_font(fonts: &mut PdfFonts, name: &str) -> PdfFontToken {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match key.as_str() {
        "helvetica" | "arial" => fonts.helvetica(),
        "helveticabold" | "arialbold" => fonts.helvetica_bold(),
        "times" | "timesroman" | "timesnewroman" => fonts.times_roman(),
        "timesbold" => fonts.times_bold(),
        "courier" | "couriernew" => fonts.courier(),
        "courierbold" => fonts.courier_bold(),
        _ => {
            warn!("Unknown standard font {:?}, using Helvetica", name);
            fonts.helvetica()
        }
    }
}

fn load_font(document: &mut PdfDocument, font: &FontConfig) -> Result<PdfFontToken, EnvelopeError> {
    match &font.path {
        Some(path) => {
            info!("Using custom font {} from {}", font.name, path.display());
            document
                .fonts_mut()
                .load_true_type_from_file(path, false)
                .map_err(|e| render_err(&format!("loading font {}", path.display()), e))
        }
        None => {
            debug!("Using standard font {}", font.name);
            Ok(builtin_font(document.fonts_mut(), &font.name))
        }
    }
}

/// Write a single A4 page carrying `address` at the window position.
pub fn create_window_page(
    pdfium: &Pdfium,
    address: &FinalAddress,
    config: &EnvelopeConfig,
    output: &Path,
) -> Result<(), EnvelopeError> {
    let geometry = WindowGeometry::from_display(&config.display);
    let (r, g, b) = config.font.rgb()?;

    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| render_err("creating document", e))?;
    let font = load_font(&mut document, &config.font)?;

    {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .map_err(|e| render_err("creating page", e))?;

        for (i, line) in address.lines().iter().enumerate() {
            let mut object = page
                .objects_mut()
                .create_text_object(
                    PdfPoints::new(geometry.left),
                    PdfPoints::new(geometry.baseline(i)),
                    line,
                    font,
                    PdfPoints::new(config.font.size),
                )
                .map_err(|e| render_err(&format!("drawing line {}", i + 1), e))?;
            object
                .set_fill_color(PdfColor::new(r, g, b, 255))
                .map_err(|e| render_err("setting text colour", e))?;
        }

        if config.show_window_border {
            page.objects_mut()
                .create_path_object_rect(
                    geometry.border(address.lines().len()),
                    Some(PdfColor::new(BORDER_GRAY, BORDER_GRAY, BORDER_GRAY, 255)),
                    Some(PdfPoints::new(BORDER_WIDTH_PT)),
                    None,
                )
                .map_err(|e| render_err("drawing window border", e))?;
        }
    }

    document
        .save_to_file(output)
        .map_err(|e| EnvelopeError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: io::Error::other(format!("{:?}", e)),
        })?;

    debug!(
        "Window page with {} line(s) written to {}",
        address.lines().len(),
        output.display()
    );
    Ok(())
}

/// Write the pages of `source` followed by the pages of `window` to `output`.
pub fn merge_pdfs(
    pdfium: &Pdfium,
    source: &Path,
    window: &Path,
    output: &Path,
) -> Result<(), EnvelopeError> {
    let merge_err = |e: PdfiumError| EnvelopeError::Merge {
        source_pdf: source.to_path_buf(),
        detail: format!("{:?}", e),
    };

    let mut merged = pdfium.load_pdf_from_file(source, None).map_err(merge_err)?;
    let window_doc = pdfium.load_pdf_from_file(window, None).map_err(merge_err)?;

    merged.pages_mut().append(&window_doc).map_err(merge_err)?;

    merged
        .save_to_file(output)
        .map_err(|e| EnvelopeError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: io::Error::other(format!("{:?}", e)),
        })?;

    info!("Merged PDF written to {}", output.display());
    Ok(())
}

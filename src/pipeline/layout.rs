//! Page layout model and the pdfium-backed layout pass.
//!
//! The extraction strategies address text by *box index*, so everything they
//! need is an ordered list of text boxes per page. [`LayoutSource`] is the
//! seam: [`PdfiumLayoutSource`] builds the boxes from a real PDF, tests and
//! callers that already hold a layout pass a [`DocumentLayout`] directly.
//!
//! ## Grouping
//!
//! pdfium reports text as *segments*: runs of characters that share a
//! baseline and a font. [`group_runs`] turns them into boxes in two passes,
//! following pdfminer's parameters:
//!
//! 1. runs that overlap vertically by at least `line_overlap` and sit within
//!    `char_margin` of each other horizontally become one line;
//! 2. lines that overlap horizontally and are separated vertically by at most
//!    `line_margin` × line height become one box.
//!
//! Boxes are numbered in the order their first line appears, top to bottom
//! then left to right.

use crate::error::ExtractionFailure;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

/// One layout-detected group of text lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBox {
    lines: Vec<String>,
}

impl TextBox {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Non-empty lines, trimmed and joined with `\n`.
    ///
    /// A box without any non-empty line yields `""` but still occupies its
    /// index on the page.
    pub fn block_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The ordered text boxes of a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLayout {
    boxes: Vec<TextBox>,
}

impl PageLayout {
    pub fn new(boxes: Vec<TextBox>) -> Self {
        Self { boxes }
    }

    /// Convenience constructor: one box per string, lines split on `\n`.
    pub fn from_blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            boxes: blocks
                .into_iter()
                .map(|b| TextBox::new(b.as_ref().lines()))
                .collect(),
        }
    }

    pub fn boxes(&self) -> &[TextBox] {
        &self.boxes
    }

    pub fn block_texts(&self) -> Vec<String> {
        self.boxes.iter().map(TextBox::block_text).collect()
    }
}

/// All pages of a document, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentLayout {
    pages: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn new(pages: Vec<PageLayout>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }
}

/// Produces the text-box layout of a PDF.
pub trait LayoutSource {
    fn load(&self, pdf_path: &Path) -> Result<DocumentLayout, ExtractionFailure>;
}

/// An already-parsed layout ignores the path and hands out a copy of itself.
impl LayoutSource for DocumentLayout {
    fn load(&self, _pdf_path: &Path) -> Result<DocumentLayout, ExtractionFailure> {
        Ok(self.clone())
    }
}

/// Grouping thresholds, relative to the height of the text involved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Minimum vertical overlap for two runs to share a line.
    pub line_overlap: f32,
    /// Maximum horizontal gap between two runs of the same line.
    pub char_margin: f32,
    /// Maximum vertical gap between two lines of the same box.
    pub line_margin: f32,
    /// Horizontal gap above which a space is inserted between runs.
    pub word_margin: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            line_overlap: 0.5,
            char_margin: 2.0,
            line_margin: 0.5,
            word_margin: 0.1,
        }
    }
}

/// A positioned run of text, in PDF user space (y grows upwards).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            text: text.into(),
            left,
            bottom,
            right,
            top,
        }
    }

    fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
}

impl Extent {
    fn of(run: &TextRun) -> Self {
        Self {
            left: run.left,
            bottom: run.bottom,
            right: run.right,
            top: run.top,
        }
    }

    fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }

    fn grow(&mut self, other: &Extent) {
        self.left = self.left.min(other.left);
        self.bottom = self.bottom.min(other.bottom);
        self.right = self.right.max(other.right);
        self.top = self.top.max(other.top);
    }

    fn vertical_overlap(&self, other: &Extent) -> f32 {
        (self.top.min(other.top) - self.bottom.max(other.bottom)).max(0.0)
    }

    fn horizontal_gap(&self, other: &Extent) -> f32 {
        (other.left - self.right).max(self.left - other.right).max(0.0)
    }

    fn overlaps_horizontally(&self, other: &Extent) -> bool {
        self.left < other.right && other.left < self.right
    }
}

struct Line {
    runs: Vec<TextRun>,
    extent: Extent,
}

impl Line {
    fn text(&self, word_margin: f32) -> String {
        let mut runs: Vec<&TextRun> = self.runs.iter().collect();
        runs.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal));

        let mut out = String::new();
        let mut prev: Option<&TextRun> = None;
        for run in runs {
            if let Some(p) = prev {
                let gap = run.left - p.right;
                let threshold = word_margin * p.height().max(run.height());
                let spaced = out.ends_with(char::is_whitespace)
                    || run.text.starts_with(char::is_whitespace);
                if gap > threshold && !spaced {
                    out.push(' ');
                }
            }
            out.push_str(&run.text);
            prev = Some(run);
        }
        out.trim().to_string()
    }
}

/// Group positioned runs into the ordered text boxes of one page.
pub fn group_runs(runs: Vec<TextRun>, params: &LayoutParams) -> PageLayout {
    let mut runs: Vec<TextRun> = runs
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .collect();
    runs.sort_by(reading_order(|r: &TextRun| (r.top, r.left)));

    // Pass 1: runs → lines
    let mut lines: Vec<Line> = Vec::new();
    for run in runs {
        let extent = Extent::of(&run);
        let joined = lines.iter_mut().rev().find(|line| {
            let min_height = line.extent.height().min(extent.height());
            let max_height = line.extent.height().max(extent.height());
            line.extent.vertical_overlap(&extent) >= params.line_overlap * min_height
                && line.extent.horizontal_gap(&extent) <= params.char_margin * max_height
        });
        match joined {
            Some(line) => {
                line.extent.grow(&extent);
                line.runs.push(run);
            }
            None => lines.push(Line {
                runs: vec![run],
                extent,
            }),
        }
    }
    lines.sort_by(reading_order(|l: &Line| (l.extent.top, l.extent.left)));

    // Pass 2: lines → boxes
    let mut boxes: Vec<BoxBuilder> = Vec::new();
    for line in lines {
        let text = line.text(params.word_margin);
        let extent = line.extent;
        let target = boxes.iter_mut().rev().find(|b| {
            let gap = b.last.bottom - extent.top;
            let max_height = b.last.height().max(extent.height());
            gap >= -params.line_overlap * max_height
                && gap <= params.line_margin * max_height
                && b.bounds.overlaps_horizontally(&extent)
        });
        match target {
            Some(b) => {
                b.bounds.grow(&extent);
                b.last = extent;
                b.lines.push(text);
            }
            None => boxes.push(BoxBuilder {
                bounds: extent,
                last: extent,
                lines: vec![text],
            }),
        }
    }

    PageLayout::new(boxes.into_iter().map(|b| TextBox::new(b.lines)).collect())
}

struct BoxBuilder {
    bounds: Extent,
    /// Extent of the most recently added line.
    last: Extent,
    lines: Vec<String>,
}

/// Top-to-bottom, then left-to-right.
fn reading_order<T, F>(key: F) -> impl Fn(&T, &T) -> Ordering
where
    F: Fn(&T) -> (f32, f32),
{
    move |a, b| {
        let (a_top, a_left) = key(a);
        let (b_top, b_left) = key(b);
        b_top
            .partial_cmp(&a_top)
            .unwrap_or(Ordering::Equal)
            .then(a_left.partial_cmp(&b_left).unwrap_or(Ordering::Equal))
    }
}

/// Layout pass backed by pdfium text segments.
pub struct PdfiumLayoutSource<'a> {
    pdfium: &'a Pdfium,
    params: LayoutParams,
    password: Option<String>,
}

impl<'a> PdfiumLayoutSource<'a> {
    pub fn new(pdfium: &'a Pdfium, params: LayoutParams) -> Self {
        Self {
            pdfium,
            params,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl LayoutSource for PdfiumLayoutSource<'_> {
    fn load(&self, pdf_path: &Path) -> Result<DocumentLayout, ExtractionFailure> {
        let fail = |detail: String| ExtractionFailure {
            path: pdf_path.to_path_buf(),
            detail,
        };

        let document = self
            .pdfium
            .load_pdf_from_file(pdf_path, self.password.as_deref())
            .map_err(|e| fail(format!("{:?}", e)))?;

        let mut pages = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| fail(format!("page {}: {:?}", idx + 1, e)))?;

            let runs: Vec<TextRun> = text
                .segments()
                .iter()
                .map(|segment| {
                    let bounds = segment.bounds();
                    TextRun::new(
                        segment.text(),
                        bounds.left().value,
                        bounds.bottom().value,
                        bounds.right().value,
                        bounds.top().value,
                    )
                })
                .collect();

            let layout = group_runs(runs, &self.params);
            debug!(
                "Page {}: {} text boxes",
                idx + 1,
                layout.boxes().len()
            );
            pages.push(layout);
        }

        Ok(DocumentLayout::new(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_text_drops_empty_lines() {
        let tb = TextBox::new(["  M. DUPONT ", "", "   ", "12 RUE X"]);
        assert_eq!(tb.block_text(), "M. DUPONT\n12 RUE X");
    }

    #[test]
    fn empty_box_keeps_its_slot() {
        let page = PageLayout::new(vec![
            TextBox::new(["Ref"]),
            TextBox::new(["", " "]),
            TextBox::new(["Name"]),
        ]);
        assert_eq!(page.block_texts(), vec!["Ref", "", "Name"]);
    }

    #[test]
    fn runs_on_one_baseline_form_a_line() {
        let runs = vec![
            TextRun::new("PARIS", 60.0, 700.0, 90.0, 710.0),
            TextRun::new("75000", 20.0, 700.0, 50.0, 710.0),
        ];
        let page = group_runs(runs, &LayoutParams::default());
        assert_eq!(page.block_texts(), vec!["75000 PARIS"]);
    }

    #[test]
    fn close_lines_share_a_box_and_far_lines_do_not() {
        let runs = vec![
            TextRun::new("M. DUPONT", 300.0, 700.0, 380.0, 710.0),
            TextRun::new("1 RUE X", 300.0, 688.0, 360.0, 698.0),
            TextRun::new("75000 PARIS", 300.0, 676.0, 390.0, 686.0),
            TextRun::new("Objet : facture", 50.0, 500.0, 160.0, 510.0),
        ];
        let page = group_runs(runs, &LayoutParams::default());
        assert_eq!(
            page.block_texts(),
            vec!["M. DUPONT\n1 RUE X\n75000 PARIS", "Objet : facture"]
        );
    }

    #[test]
    fn side_by_side_columns_stay_separate() {
        let runs = vec![
            TextRun::new("Ref: 42", 50.0, 700.0, 100.0, 710.0),
            TextRun::new("M. DUPONT", 350.0, 700.0, 430.0, 710.0),
            TextRun::new("1 RUE X", 350.0, 688.0, 410.0, 698.0),
        ];
        let page = group_runs(runs, &LayoutParams::default());
        assert_eq!(page.block_texts(), vec!["Ref: 42", "M. DUPONT\n1 RUE X"]);
    }

    #[test]
    fn whitespace_runs_are_ignored() {
        let runs = vec![
            TextRun::new("   ", 0.0, 0.0, 10.0, 10.0),
            TextRun::new("Hello", 0.0, 100.0, 30.0, 110.0),
        ];
        let page = group_runs(runs, &LayoutParams::default());
        assert_eq!(page.block_texts(), vec!["Hello"]);
    }

    #[test]
    fn parsed_layout_is_its_own_source() {
        let layout = DocumentLayout::new(vec![PageLayout::from_blocks(["a", "b\nc"])]);
        let loaded = layout.load(Path::new("ignored.pdf")).unwrap();
        assert_eq!(loaded.pages()[0].block_texts(), vec!["a", "b\nc"]);
    }
}

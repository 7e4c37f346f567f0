//! End-to-end processing of one letter.
//!
//! [`Pipeline`] strings the stages together: validate the input, search the
//! layout for an acceptable candidate, finalize the address (correction or
//! manual review), then print it on a window page appended to the letter.
//! Stages run strictly in that order on the calling thread.
//!
//! "No candidate" is an outcome, not an error: the operator fixes it by
//! adjusting `search_string`, `extraction_type` or the validation regex, and
//! [`RunOutcome::NoCandidate`] carries what is needed to say so.

use crate::api::AddressApi;
use crate::config::EnvelopeConfig;
use crate::edit::ManualEditor;
use crate::error::{EnvelopeError, ExtractionFailure};
use crate::operator::Operator;
use crate::pipeline::correct::{AddressCorrection, FinalAddress};
use crate::pipeline::layout::{DocumentLayout, LayoutSource, PdfiumLayoutSource};
use crate::pipeline::search::{CandidateSearch, CandidateValidator, SearchOutcome};
use crate::pipeline::{input, render};
use crate::progress::{self, ProgressCallback};
use pdfium_render::prelude::Pdfium;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A finalized address, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Address { address: FinalAddress, skip: usize },
    NoCandidate {
        attempts: usize,
        last_failure: Option<ExtractionFailure>,
    },
}

/// What a full run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The merged PDF was written to `output`.
    Merged {
        output: PathBuf,
        address: FinalAddress,
        skip: usize,
    },
    /// Dry run: the address was finalized but nothing was written.
    Finalized { address: FinalAddress, skip: usize },
    /// The search loop exhausted its attempts.
    NoCandidate {
        attempts: usize,
        last_failure: Option<ExtractionFailure>,
    },
}

/// Runs the stages for one input PDF.
pub struct Pipeline<'a> {
    config: &'a EnvelopeConfig,
    validator: Option<CandidateValidator>,
    api: Option<&'a dyn AddressApi>,
    operator: &'a mut dyn Operator,
    editor: &'a mut dyn ManualEditor,
    progress: ProgressCallback,
    correct: bool,
    dry_run: bool,
    output: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a EnvelopeConfig,
        operator: &'a mut dyn Operator,
        editor: &'a mut dyn ManualEditor,
    ) -> Self {
        Self {
            config,
            validator: None,
            api: None,
            operator,
            editor,
            progress: progress::noop(),
            correct: true,
            dry_run: false,
            output: None,
        }
    }

    /// Regex candidates must match; `None` accepts the first attempt.
    pub fn validator(mut self, validator: Option<CandidateValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Address service; `None` passes applicable candidates through.
    pub fn api(mut self, api: Option<&'a dyn AddressApi>) -> Self {
        self.api = api;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    /// Skip finalization and print the candidate as found. Default: false.
    pub fn skip_correction(mut self, skip: bool) -> Self {
        self.correct = !skip;
        self
    }

    /// Stop after finalization without writing any PDF. Default: false.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the merged PDF path (default `<stem>_merged.pdf`).
    pub fn output(mut self, path: Option<PathBuf>) -> Self {
        self.output = path;
        self
    }

    /// Search `pdf_path` and finalize the address.
    pub fn prepare(
        &mut self,
        source: &dyn LayoutSource,
        pdf_path: &Path,
    ) -> Result<Prepared, EnvelopeError> {
        // ── Step 1: Candidate search ─────────────────────────────────────
        let outcome = CandidateSearch::new(
            source,
            self.config.extraction_type,
            self.config.search_string.as_str(),
        )
        .validator(self.validator.clone())
        .max_skip(self.config.search.max_skip)
        .progress(self.progress.clone())
        .run(pdf_path);

        let (candidate, skip) = match outcome {
            SearchOutcome::Found { text, skip } => (text, skip),
            SearchOutcome::NotFound {
                attempts,
                last_failure,
            } => {
                return Ok(Prepared::NoCandidate {
                    attempts,
                    last_failure,
                })
            }
        };
        debug!("Candidate:\n{}", candidate);

        // ── Step 2: Finalize ─────────────────────────────────────────────
        let address = if self.correct {
            AddressCorrection::new(self.api, &mut *self.operator, &mut *self.editor)
                .locale_marker(self.config.locale_marker.as_str())
                .lieu_dit_min_query_lines(self.config.correction.lieu_dit_min_query_lines)
                .progress(self.progress.clone())
                .finalize(&candidate)?
        } else {
            info!("Correction disabled; using the candidate as found");
            FinalAddress::new(candidate.lines().map(str::to_string).collect())
        };

        Ok(Prepared::Address { address, skip })
    }

    /// Full run against a real PDF.
    pub fn process(&mut self, pdfium: &Pdfium, pdf_path: &Path) -> Result<RunOutcome, EnvelopeError> {
        let start = Instant::now();
        info!("Processing {}", pdf_path.display());

        let pdf_path = input::resolve_local(pdf_path)?;
        let source = PdfiumLayoutSource::new(pdfium, self.config.layout);

        let (address, skip) = match self.prepare(&source, &pdf_path)? {
            Prepared::Address { address, skip } => (address, skip),
            Prepared::NoCandidate {
                attempts,
                last_failure,
            } => {
                return Ok(RunOutcome::NoCandidate {
                    attempts,
                    last_failure,
                })
            }
        };

        if self.dry_run {
            return Ok(RunOutcome::Finalized { address, skip });
        }

        // ── Step 3: Window page + merge ──────────────────────────────────
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| input::merged_output_path(&pdf_path));
        write_envelope(pdfium, &pdf_path, &address, self.config, &output)?;

        info!(
            "Done in {}ms: {}",
            start.elapsed().as_millis(),
            output.display()
        );
        Ok(RunOutcome::Merged {
            output,
            address,
            skip,
        })
    }
}

/// Render the window page to a scoped temporary file and merge it after the
/// pages of `pdf_path` into `output`.
pub fn write_envelope(
    pdfium: &Pdfium,
    pdf_path: &Path,
    address: &FinalAddress,
    config: &EnvelopeConfig,
    output: &Path,
) -> Result<(), EnvelopeError> {
    let window = tempfile::Builder::new()
        .prefix("pdf-envelope-window-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| EnvelopeError::Internal(format!("temporary window page: {}", e)))?;

    render::create_window_page(pdfium, address, config, window.path())?;
    render::merge_pdfs(pdfium, pdf_path, window.path(), output)?;

    if let Err(e) = window.close() {
        warn!("Could not remove temporary window page: {}", e);
    }
    Ok(())
}

/// Text boxes of every page, for tuning `search_string` and the strategy.
pub fn dump_layout(layout: &DocumentLayout) -> String {
    let mut out = String::new();
    for (page_num, page) in layout.pages().iter().enumerate() {
        let _ = writeln!(out, "------ Page {} ------", page_num + 1);
        for (idx, text) in page.block_texts().iter().enumerate() {
            let _ = writeln!(out, "[TextBox {}]", idx);
            if !text.is_empty() {
                let _ = writeln!(out, "{}", text);
            }
            out.push('\n');
        }
    }
    out
}

//! Error types for the pdf-envelope library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EnvelopeError`], **fatal**: the run cannot proceed (bad input file,
//!   address service failure, operator picked an option that does not exist).
//!   Returned as `Err(EnvelopeError)` from [`crate::run::Pipeline::process`] and the
//!   correction workflow.
//!
//! * [`ExtractionFailure`], **non-fatal**: the layout of the PDF could not be
//!   read for one extraction attempt. Stored inside
//!   [`crate::pipeline::extract::Candidate::Failed`] so the search loop can
//!   treat it like a candidate that did not validate and keep going.
//!
//! "No candidate found" is not an error at all: it is
//! [`crate::pipeline::search::SearchOutcome::NotFound`], a terminal outcome the
//! operator fixes by adjusting the configuration.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-envelope library.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Address service errors ────────────────────────────────────────────
    /// The address service answered with a non-success status, or the call
    /// failed before any status was received (timeout, connection refused).
    #[error("Address service error{}: {body}", status_label(.status))]
    ExternalService { status: Option<u16>, body: String },

    /// The list lookup returned no candidate address.
    #[error("Address not found: {query}\nCheck the extracted text or edit it manually.")]
    AddressNotFound { query: String },

    /// The operator's answer is outside the enumerated options.
    #[error("Invalid choice: {input:?} (expected a number between 1 and {options})")]
    InvalidSelection { input: String, options: usize },

    /// The candidate has too few lines to build a lookup query from.
    #[error("Cannot build an address query from {lines} line(s); at least 3 are required")]
    QueryTooShort { lines: usize },

    // ── Manual edit errors ────────────────────────────────────────────────
    /// No editor-launch mechanism is known for this host.
    #[error("Unsupported platform '{os}' for manual editing.\nSet `edit.editor` in config.json.")]
    UnsupportedPlatform { os: String },

    /// The editor process could not be started.
    #[error("Failed to launch editor '{program}': {source}")]
    EditorLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading an answer from the operator failed (stdin closed, etc.).
    #[error("Failed to read operator input: {0}")]
    OperatorInput(#[source] std::io::Error),

    // ── PDF output errors ─────────────────────────────────────────────────
    /// Drawing the window page failed.
    #[error("Failed to render window page: {0}")]
    Render(String),

    /// Appending the window page to the source document failed.
    #[error("Failed to merge '{source_pdf}' with the window page: {detail}")]
    Merge { source_pdf: PathBuf, detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The validation regex does not compile.
    #[error("Invalid validation regex in '{path}': {detail}")]
    InvalidRegex { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or place the library next to the\n\
executable or in the working directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// A non-fatal failure while reading a PDF's text layout.
///
/// Carried by [`crate::pipeline::extract::Candidate::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Layout extraction failed for '{path}': {detail}")]
pub struct ExtractionFailure {
    pub path: PathBuf,
    pub detail: String,
}

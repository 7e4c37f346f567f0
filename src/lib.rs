//! # pdf-envelope
//!
//! Find the recipient address in a generated letter PDF, normalise it, and
//! append a page that prints it where a window envelope shows it.
//!
//! ## Why this crate?
//!
//! Letters produced by business software put the address wherever their
//! template says, usually next to a reference line or a sender block but
//! without any marker of its own. Folding such a letter into a window
//! envelope means reprinting the address at the window position. This crate
//! locates the address by its position relative to an anchor string, checks
//! it against a regex, corrects it with La Poste's address API, and appends
//! an A4 page with the address at the configured window position.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate path and %PDF magic
//!  ├─ 2. Layout   text runs → lines → boxes (pdfium)
//!  ├─ 3. Search   box near the anchor, skip 0..=5 until the regex matches
//!  ├─ 4. Correct  La Poste lookup, operator choice, manual edit
//!  └─ 5. Output   window page appended → <stem>_merged.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_envelope::{bind_pdfium, ConsoleOperator, EnvelopeConfig, ManualEditStation, Pipeline};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EnvelopeConfig::load(Path::new("config.json"))?;
//!     let pdfium = bind_pdfium()?;
//!     let mut operator = ConsoleOperator::stdio();
//!     let mut editor = ManualEditStation::from_config(&config.edit);
//!
//!     let outcome = Pipeline::new(&config, &mut operator, &mut editor)
//!         .skip_correction(true)
//!         .process(&pdfium, Path::new("letter.pdf"))?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-envelope` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-envelope = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod operator;
pub mod pipeline;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{AddressApi, AddressDetail, AddressMatch, ApiKey, LaPosteClient};
pub use config::{EnvelopeConfig, EnvelopeConfigBuilder};
pub use edit::{EditPayload, ManualEditStation, ManualEditor};
pub use engine::bind_pdfium;
pub use error::{EnvelopeError, ExtractionFailure};
pub use operator::{ConsoleOperator, Operator};
pub use pipeline::correct::FinalAddress;
pub use pipeline::extract::{Candidate, ExtractionStrategy};
pub use pipeline::search::{CandidateValidator, SearchOutcome};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{Pipeline, Prepared, RunOutcome};

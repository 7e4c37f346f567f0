//! Bounded candidate search: widen `skip` until a candidate validates.
//!
//! A letter template is rarely laid out exactly as expected: an extra box
//! (a reference line, a logo caption) can sit between the anchor and the
//! address. The loop retries the extractor with `skip = 0, 1, …, max_skip`
//! and keeps the first candidate the validation regex accepts. Without a
//! regex there is nothing to judge a candidate by, so the first attempt wins.
//!
//! The layout is parsed once per search and reused by every attempt.

use crate::error::ExtractionFailure;
use crate::pipeline::extract::{extract, Candidate, ExtractionStrategy};
use crate::pipeline::layout::LayoutSource;
use crate::progress::{self, ProgressCallback};
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tracing::{debug, info, warn};

/// Highest `skip` tried by default (six attempts: 0 through 5).
pub const MAX_SKIP: usize = 5;

/// A verbose-mode regex that a candidate must contain a match of.
#[derive(Debug, Clone)]
pub struct CandidateValidator {
    regex: Regex,
}

impl CandidateValidator {
    /// Compile `pattern` with insignificant whitespace and `#` comments.
    ///
    /// As in the usual verbose dialect, whitespace and `#` inside a character
    /// class stay literal. An empty pattern matches every candidate.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&escape_class_literals(pattern))
            .ignore_whitespace(true)
            .build()?;
        Ok(Self { regex })
    }

    pub fn accepts(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Escape the characters that `ignore_whitespace` would otherwise drop or
/// reinterpret inside `[...]`: whitespace, `#`, and the `[ & ~` that the
/// regex crate reads as nested classes and set operators.
///
/// Outside classes the pattern is copied as is, comments included.
fn escape_class_literals(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(c);
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }

        if !in_class {
            match c {
                '#' => {
                    out.push(c);
                    for rest in chars.by_ref() {
                        out.push(rest);
                        if rest == '\n' {
                            break;
                        }
                    }
                }
                '[' => {
                    out.push(c);
                    in_class = true;
                    if chars.peek() == Some(&'^') {
                        out.push('^');
                        chars.next();
                    }
                    // A leading `]` is a literal member.
                    if chars.peek() == Some(&']') {
                        out.push_str("\\]");
                        chars.next();
                    }
                }
                _ => out.push(c),
            }
            continue;
        }

        match c {
            ']' => {
                out.push(c);
                in_class = false;
            }
            ' ' => out.push_str("\\ "),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '#' | '[' | '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_whitespace() => out.push_str(&format!("\\x{{{:X}}}", c as u32)),
            _ => out.push(c),
        }
    }

    out
}

/// What the search loop concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A candidate was accepted at `skip`.
    Found { text: String, skip: usize },
    /// Every attempt was rejected. `last_failure` is set when the layout
    /// itself could not be read.
    NotFound {
        attempts: usize,
        last_failure: Option<ExtractionFailure>,
    },
}

/// Drives the extractor across increasing `skip` values.
pub struct CandidateSearch<'a> {
    source: &'a dyn LayoutSource,
    strategy: ExtractionStrategy,
    search_string: String,
    validator: Option<CandidateValidator>,
    max_skip: usize,
    progress: ProgressCallback,
}

impl<'a> CandidateSearch<'a> {
    pub fn new(
        source: &'a dyn LayoutSource,
        strategy: ExtractionStrategy,
        search_string: impl Into<String>,
    ) -> Self {
        Self {
            source,
            strategy,
            search_string: search_string.into(),
            validator: None,
            max_skip: MAX_SKIP,
            progress: progress::noop(),
        }
    }

    pub fn validator(mut self, validator: Option<CandidateValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn max_skip(mut self, max_skip: usize) -> Self {
        self.max_skip = max_skip;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    /// Search `pdf_path` for an acceptable candidate.
    pub fn run(&self, pdf_path: &Path) -> SearchOutcome {
        info!(
            "Searching {} for the box {} {:?}",
            pdf_path.display(),
            self.strategy,
            self.search_string
        );

        let layout = self.source.load(pdf_path);
        if let Err(ref e) = layout {
            warn!("{}", e);
        }

        let mut attempts = 0;
        let mut last_failure = None;

        for skip in 0..=self.max_skip {
            attempts += 1;
            let candidate = extract(&layout, self.strategy, skip, &self.search_string);

            debug!("skip={} candidate={:?}", skip, candidate);

            let accepted = match candidate {
                Candidate::Failed(failure) => {
                    last_failure = Some(failure);
                    None
                }
                Candidate::Text(text) => match &self.validator {
                    Some(v) if !v.accepts(&text) => None,
                    _ => Some(text),
                },
            };
            self.progress.on_search_attempt(skip, accepted.is_some());

            if let Some(text) = accepted {
                info!("Candidate accepted at skip={}", skip);
                self.progress.on_candidate_found(skip, &text);
                return SearchOutcome::Found { text, skip };
            }

            if self.validator.is_none() {
                break;
            }
        }

        warn!("No acceptable candidate after {} attempt(s)", attempts);
        SearchOutcome::NotFound {
            attempts,
            last_failure,
        }
    }
}

//! Positional block extraction.
//!
//! The address on a letter rarely carries a reliable marker of its own, but
//! something next to it usually does ("Réf. client", "Objet", a sender line).
//! The extractor finds every text box containing the configured search string
//! and returns either that box, the one after it, or the one before it,
//! widened by `skip` so a retry can look one box further away.

use crate::error::ExtractionFailure;
use crate::pipeline::layout::{DocumentLayout, PageLayout};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which box, relative to a box containing the search string, is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// The matching box itself.
    Contains,
    /// The box at `index + 1 + skip`.
    #[default]
    Following,
    /// The box at `index - 1 - skip`.
    Preceding,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStrategy::Contains => "CONTAINS",
            ExtractionStrategy::Following => "FOLLOWING",
            ExtractionStrategy::Preceding => "PRECEDING",
        };
        f.write_str(name)
    }
}

/// The result of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Selected text; may be empty when nothing matched.
    Text(String),
    /// The layout could not be read.
    Failed(ExtractionFailure),
}

impl Candidate {
    pub fn text(&self) -> Option<&str> {
        match self {
            Candidate::Text(t) => Some(t),
            Candidate::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Candidate::Failed(_))
    }
}

/// Select text from a layout that may have failed to load.
///
/// A load failure becomes [`Candidate::Failed`]; nothing propagates.
pub fn extract(
    layout: &Result<DocumentLayout, ExtractionFailure>,
    strategy: ExtractionStrategy,
    skip: usize,
    search: &str,
) -> Candidate {
    match layout {
        Ok(doc) => Candidate::Text(extract_document(doc, strategy, skip, search)),
        Err(failure) => Candidate::Failed(failure.clone()),
    }
}

/// Apply the strategy page by page and concatenate the results.
pub fn extract_document(
    layout: &DocumentLayout,
    strategy: ExtractionStrategy,
    skip: usize,
    search: &str,
) -> String {
    layout
        .pages()
        .iter()
        .map(|page| extract_page(page, strategy, skip, search))
        .collect()
}

/// Apply the strategy to one page. Matches are concatenated without a
/// separator, in box order.
pub fn extract_page(
    page: &PageLayout,
    strategy: ExtractionStrategy,
    skip: usize,
    search: &str,
) -> String {
    let blocks = page.block_texts();
    let mut out = String::new();

    for (idx, text) in blocks.iter().enumerate() {
        if !text.contains(search) {
            continue;
        }
        let selected = match strategy {
            ExtractionStrategy::Contains => Some(idx),
            ExtractionStrategy::Following => Some(idx + 1 + skip).filter(|&i| i < blocks.len()),
            ExtractionStrategy::Preceding => idx.checked_sub(1 + skip),
        };
        if let Some(i) = selected {
            out.push_str(&blocks[i]);
        }
    }

    out
}

//! Address correction against the national address reference.
//!
//! A validated candidate is still raw OCR-free text from a letter template:
//! wrong case, missing hamlet names, outdated street spellings. When the
//! candidate carries the locale marker, this stage asks the address service
//! for the normalised form, lets the operator pick among several matches or
//! fall back to typing the address, and produces the [`FinalAddress`] that is
//! printed in the envelope window.
//!
//! ```text
//! candidate ──(marker?)──no──▶ manual edit (prefilled) ─────────────┐
//!     │yes                                                          │
//!     ▼                                                             ▼
//! prepare query ─▶ list lookup ─▶ 0: AddressNotFound          FinalAddress
//!                      │          1: confirm / manual               ▲
//!                      │          N: choose / manual ───────────────┤
//!                      ▼                                            │
//!                 detail lookup ─▶ lieu-dit synthesis ─▶ confirm ───┘
//! ```

use crate::api::{AddressApi, AddressMatch};
use crate::config::LIEU_DIT_MIN_QUERY_LINES;
use crate::edit::{EditPayload, ManualEditor};
use crate::error::EnvelopeError;
use crate::operator::Operator;
use crate::progress::{self, ProgressCallback};
use std::fmt;
use tracing::{debug, info, warn};

/// The address lines handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAddress {
    lines: Vec<String>,
}

impl FinalAddress {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for FinalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Capitalise the first cased character of every word and lowercase the rest.
///
/// A word starts after any character that is neither upper- nor lowercase,
/// so `"o'neil"` becomes `"O'Neil"` and `"1st"` becomes `"1St"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_lowercase() || c.is_uppercase();
    }
    out
}

/// Build the lookup query from a candidate.
///
/// The first line (recipient) and last line (country) are dropped; of the
/// remaining last line only the first word, the postcode, is kept.
pub fn prepare_query(candidate: &str) -> Result<Vec<String>, EnvelopeError> {
    let lines: Vec<&str> = candidate.lines().collect();
    if lines.len() < 3 {
        return Err(EnvelopeError::QueryTooShort { lines: lines.len() });
    }

    let mut query: Vec<String> = lines[1..lines.len() - 1]
        .iter()
        .map(|l| l.to_string())
        .collect();
    if let Some(last) = query.last_mut() {
        let postcode = last.split(' ').next().unwrap_or_default().to_string();
        *last = postcode;
    }
    Ok(query)
}

/// Whether the candidate is eligible for automatic correction.
pub fn is_applicable(candidate: &str, locale_marker: &str) -> bool {
    candidate.contains(locale_marker)
}

fn is_yes(answer: &str) -> bool {
    answer.to_lowercase() == "y"
}

enum Choice {
    Service(AddressMatch),
    Manual(Vec<String>),
}

/// Turns a validated candidate into a [`FinalAddress`].
///
/// Without an [`AddressApi`] (no usable credential) applicable candidates are
/// passed through unchanged.
pub struct AddressCorrection<'a> {
    api: Option<&'a dyn AddressApi>,
    operator: &'a mut dyn Operator,
    editor: &'a mut dyn ManualEditor,
    locale_marker: String,
    lieu_dit_min_query_lines: usize,
    progress: ProgressCallback,
}

impl<'a> AddressCorrection<'a> {
    pub fn new(
        api: Option<&'a dyn AddressApi>,
        operator: &'a mut dyn Operator,
        editor: &'a mut dyn ManualEditor,
    ) -> Self {
        Self {
            api,
            operator,
            editor,
            locale_marker: "FRANCE".to_string(),
            lieu_dit_min_query_lines: LIEU_DIT_MIN_QUERY_LINES,
            progress: progress::noop(),
        }
    }

    pub fn locale_marker(mut self, marker: impl Into<String>) -> Self {
        self.locale_marker = marker.into();
        self
    }

    pub fn lieu_dit_min_query_lines(mut self, n: usize) -> Self {
        self.lieu_dit_min_query_lines = n;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    /// Correct the candidate if it carries the locale marker, otherwise hand
    /// it to the operator for a manual pass.
    pub fn finalize(&mut self, candidate: &str) -> Result<FinalAddress, EnvelopeError> {
        if is_applicable(candidate, &self.locale_marker) {
            return self.correct(candidate);
        }

        info!(
            "Locale marker {:?} not found; opening the address for manual review",
            self.locale_marker
        );
        let edited = self.editor.edit(EditPayload::Text(candidate.to_string()))?;
        Ok(FinalAddress::new(edited.into_lines()))
    }

    /// Run the correction workflow on an applicable candidate.
    pub fn correct(&mut self, candidate: &str) -> Result<FinalAddress, EnvelopeError> {
        let Some(api) = self.api else {
            warn!("Ignoring address check, no valid API key found");
            return Ok(FinalAddress::new(
                candidate.lines().map(str::to_string).collect(),
            ));
        };

        let query = prepare_query(candidate)?;
        debug!("Lookup query: {:?}", query);

        self.progress.on_lookup_start("list lookup");
        let matches = api.search(&query)?;
        self.progress.on_lookup_complete("list lookup");

        let block = match self.choose(candidate, matches)? {
            Choice::Manual(lines) => lines,
            Choice::Service(chosen) => self.resolve(api, &chosen, &query)?,
        };

        let first = candidate.lines().next().unwrap_or_default();
        let mut lines = Vec::with_capacity(block.len() + 1);
        lines.push(title_case(first));
        lines.extend(block);
        Ok(FinalAddress::new(lines))
    }

    fn choose(
        &mut self,
        candidate: &str,
        mut matches: Vec<AddressMatch>,
    ) -> Result<Choice, EnvelopeError> {
        match matches.len() {
            0 => Err(EnvelopeError::AddressNotFound {
                query: candidate.to_string(),
            }),
            1 => {
                self.operator.show("Address found:")?;
                self.operator.show(&format!("• {}", matches[0].adresse))?;
                let answer = self.operator.ask("Use auto? (y/n)")?;
                if is_yes(&answer) {
                    Ok(Choice::Service(matches.remove(0)))
                } else {
                    self.manual_entry()
                }
            }
            n => {
                self.operator.show("Multiple addresses found:")?;
                for (i, m) in matches.iter().enumerate() {
                    self.operator.show(&format!("• {} - {}", i + 1, m.adresse))?;
                }
                self.operator.show(&format!("• {} - Manual entry", n + 1))?;

                let answer = self.operator.ask("Choose an address")?;
                let picked = answer
                    .bytes()
                    .all(|b| b.is_ascii_digit())
                    .then(|| answer.parse::<usize>().ok())
                    .flatten();
                match picked {
                    _ if answer == (n + 1).to_string() => self.manual_entry(),
                    Some(k) if (1..=n).contains(&k) => Ok(Choice::Service(matches.swap_remove(k - 1))),
                    _ => Err(EnvelopeError::InvalidSelection {
                        input: answer,
                        options: n + 1,
                    }),
                }
            }
        }
    }

    fn manual_entry(&mut self) -> Result<Choice, EnvelopeError> {
        let edited = self.editor.edit(EditPayload::Text(String::new()))?;
        Ok(Choice::Manual(edited.into_lines()))
    }

    fn resolve(
        &mut self,
        api: &dyn AddressApi,
        chosen: &AddressMatch,
        query: &[String],
    ) -> Result<Vec<String>, EnvelopeError> {
        self.progress.on_lookup_start("detail lookup");
        let mut detail = api.detail(&chosen.code)?;
        self.progress.on_lookup_complete("detail lookup");

        if detail.lieu_dit.is_empty() && query.len() >= self.lieu_dit_min_query_lines {
            info!("Applied lieu-dit {:?} from the query", query[0]);
            detail.lieu_dit = query[0].clone();
            detail.bloc_adresse.insert(0, query[0].to_uppercase());
        }

        if detail.lieu_dit.is_empty() {
            return Ok(detail.bloc_adresse);
        }

        self.operator
            .show(&format!("Applied lieu-dit: {}", detail.lieu_dit))?;
        let answer = self.operator.ask("Keep? (y=yes, n=edit)")?;
        if is_yes(&answer) {
            return Ok(detail.bloc_adresse);
        }
        let edited = self.editor.edit(EditPayload::Lines(detail.bloc_adresse))?;
        Ok(edited.into_lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AddressDetail;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    struct FakeApi {
        matches: Vec<AddressMatch>,
        details: HashMap<String, AddressDetail>,
        queries: RefCell<Vec<Vec<String>>>,
        detail_codes: RefCell<Vec<String>>,
    }

    impl FakeApi {
        fn new(matches: &[(&str, &str)]) -> Self {
            Self {
                matches: matches
                    .iter()
                    .map(|(adresse, code)| AddressMatch {
                        adresse: adresse.to_string(),
                        code: code.to_string(),
                    })
                    .collect(),
                details: HashMap::new(),
                queries: RefCell::new(Vec::new()),
                detail_codes: RefCell::new(Vec::new()),
            }
        }

        fn with_detail(mut self, code: &str, lieu_dit: &str, bloc: &[&str]) -> Self {
            self.details.insert(
                code.to_string(),
                AddressDetail {
                    lieu_dit: lieu_dit.to_string(),
                    bloc_adresse: bloc.iter().map(|s| s.to_string()).collect(),
                },
            );
            self
        }
    }

    impl AddressApi for FakeApi {
        fn search(&self, query: &[String]) -> Result<Vec<AddressMatch>, EnvelopeError> {
            self.queries.borrow_mut().push(query.to_vec());
            Ok(self.matches.clone())
        }

        fn detail(&self, code: &str) -> Result<AddressDetail, EnvelopeError> {
            self.detail_codes.borrow_mut().push(code.to_string());
            self.details
                .get(code)
                .cloned()
                .ok_or_else(|| EnvelopeError::ExternalService {
                    status: Some(404),
                    body: code.to_string(),
                })
        }
    }

    struct Scripted {
        answers: VecDeque<&'static str>,
        shown: Vec<String>,
        asked: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                shown: Vec::new(),
                asked: Vec::new(),
            }
        }
    }

    impl Operator for Scripted {
        fn show(&mut self, message: &str) -> Result<(), EnvelopeError> {
            self.shown.push(message.to_string());
            Ok(())
        }

        fn ask(&mut self, prompt: &str) -> Result<String, EnvelopeError> {
            self.asked.push(prompt.to_string());
            Ok(self.answers.pop_front().unwrap_or_default().to_string())
        }
    }

    struct RecordingEditor {
        reply: &'static str,
        received: Vec<EditPayload>,
    }

    impl RecordingEditor {
        fn replying(reply: &'static str) -> Self {
            Self {
                reply,
                received: Vec::new(),
            }
        }
    }

    impl ManualEditor for RecordingEditor {
        fn edit(&mut self, payload: EditPayload) -> Result<EditPayload, EnvelopeError> {
            self.received.push(payload.clone());
            Ok(payload.reshape(self.reply.to_string()))
        }
    }

    const CANDIDATE: &str = "m. jean DUPONT\n12 RUE DES LILAS\n75011 PARIS\nFRANCE";

    #[test]
    fn title_case_follows_word_boundaries() {
        assert_eq!(title_case("m. jean DUPONT"), "M. Jean Dupont");
        assert_eq!(title_case("o'neil-SMITH"), "O'Neil-Smith");
        assert_eq!(title_case("1st floor"), "1St Floor");
        assert_eq!(title_case("ÉLODIE"), "Élodie");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn query_drops_edges_and_keeps_postcode() {
        assert_eq!(
            prepare_query(CANDIDATE).unwrap(),
            vec!["12 RUE DES LILAS", "75011"]
        );
        assert_eq!(
            prepare_query("A\nLES PINS\n3 CHEMIN X\n13100 AIX EN PROVENCE\nFRANCE").unwrap(),
            vec!["LES PINS", "3 CHEMIN X", "13100"]
        );
    }

    #[test]
    fn short_candidate_cannot_build_a_query() {
        let err = prepare_query("A\nFRANCE").unwrap_err();
        assert!(matches!(err, EnvelopeError::QueryTooShort { lines: 2 }));
    }

    #[test]
    fn missing_key_passes_candidate_through() {
        let mut op = Scripted::new(&[]);
        let mut ed = RecordingEditor::replying("unused");
        let out = AddressCorrection::new(None, &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();
        assert_eq!(out.to_text(), CANDIDATE);
        assert!(op.asked.is_empty());
        assert!(ed.received.is_empty());
    }

    #[test]
    fn zero_results_is_address_not_found() {
        let api = FakeApi::new(&[]);
        let mut op = Scripted::new(&[]);
        let mut ed = RecordingEditor::replying("");
        let err = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::AddressNotFound { .. }));
        assert!(api.detail_codes.borrow().is_empty());
    }

    #[test]
    fn single_result_accepted_uses_detail_block() {
        let api = FakeApi::new(&[("12 RUE DES LILAS 75011 PARIS", "c1")])
            .with_detail("c1", "", &["12 RUE DES LILAS", "75011 PARIS"]);
        let mut op = Scripted::new(&["Y"]);
        let mut ed = RecordingEditor::replying("");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();

        assert_eq!(
            out.lines(),
            ["M. Jean Dupont", "12 RUE DES LILAS", "75011 PARIS"]
        );
        assert_eq!(
            api.queries.borrow()[0],
            vec!["12 RUE DES LILAS".to_string(), "75011".to_string()]
        );
        assert_eq!(op.asked, vec!["Use auto? (y/n)"]);
        assert!(op.shown.iter().any(|s| s.contains("12 RUE DES LILAS 75011 PARIS")));
    }

    #[test]
    fn single_result_declined_goes_to_manual_edit() {
        let api = FakeApi::new(&[("12 RUE DES LILAS 75011 PARIS", "c1")]);
        let mut op = Scripted::new(&["n"]);
        let mut ed = RecordingEditor::replying("12 RUE DES LILAS\n75011 PARIS");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();

        assert_eq!(ed.received, vec![EditPayload::Text(String::new())]);
        assert!(api.detail_codes.borrow().is_empty());
        assert_eq!(
            out.to_text(),
            "M. Jean Dupont\n12 RUE DES LILAS\n75011 PARIS"
        );
    }

    #[test]
    fn many_results_select_k_uses_kth_code() {
        let api = FakeApi::new(&[("A", "c1"), ("B", "c2"), ("C", "c3")])
            .with_detail("c2", "", &["B LINE", "75011 PARIS"]);
        let mut op = Scripted::new(&["2"]);
        let mut ed = RecordingEditor::replying("");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();

        assert_eq!(*api.detail_codes.borrow(), vec!["c2".to_string()]);
        assert_eq!(out.lines()[1], "B LINE");
        assert_eq!(op.shown.last().map(String::as_str), Some("• 4 - Manual entry"));
        assert!(op.shown.contains(&"• 2 - B".to_string()));
    }

    #[test]
    fn many_results_manual_option() {
        let api = FakeApi::new(&[("A", "c1"), ("B", "c2")]);
        let mut op = Scripted::new(&["3"]);
        let mut ed = RecordingEditor::replying("LINE 1\nLINE 2");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();

        assert_eq!(out.lines(), ["M. Jean Dupont", "LINE 1", "LINE 2"]);
        assert!(api.detail_codes.borrow().is_empty());
    }

    #[test]
    fn many_results_invalid_choice() {
        for bad in ["0", "4", "03", "003", "x", "", "+1", "-1"] {
            let api = FakeApi::new(&[("A", "c1"), ("B", "c2")]);
            let mut op = Scripted::new(&[bad]);
            let mut ed = RecordingEditor::replying("");
            let err = AddressCorrection::new(Some(&api), &mut op, &mut ed)
                .correct(CANDIDATE)
                .unwrap_err();
            assert!(
                matches!(err, EnvelopeError::InvalidSelection { options: 3, .. }),
                "input {bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn lieu_dit_is_synthesised_from_long_query() {
        let candidate = "mme durand\nLes Pins\n3 CHEMIN X\n13100 AIX EN PROVENCE\nFRANCE";
        let api = FakeApi::new(&[("3 CHEMIN X 13100 AIX EN PROVENCE", "c1")])
            .with_detail("c1", "", &["3 CHEMIN X", "13100 AIX EN PROVENCE"]);
        let mut op = Scripted::new(&["y", "y"]);
        let mut ed = RecordingEditor::replying("");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(candidate)
            .unwrap();

        assert_eq!(
            out.lines(),
            ["Mme Durand", "LES PINS", "3 CHEMIN X", "13100 AIX EN PROVENCE"]
        );
        assert_eq!(op.asked, vec!["Use auto? (y/n)", "Keep? (y=yes, n=edit)"]);
    }

    #[test]
    fn short_query_gets_no_lieu_dit_and_no_confirmation() {
        let api = FakeApi::new(&[("x", "c1")]).with_detail("c1", "", &["12 RUE DES LILAS"]);
        let mut op = Scripted::new(&["y"]);
        let mut ed = RecordingEditor::replying("");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();
        assert_eq!(out.lines(), ["M. Jean Dupont", "12 RUE DES LILAS"]);
        assert_eq!(op.asked.len(), 1);
    }

    #[test]
    fn rejected_lieu_dit_edits_block_as_lines() {
        let api = FakeApi::new(&[("x", "c1")])
            .with_detail("c1", "LE HAMEAU", &["LE HAMEAU", "75011 PARIS"]);
        let mut op = Scripted::new(&["y", "n"]);
        let mut ed = RecordingEditor::replying("LE HAMEAU NORD\n75011 PARIS");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .correct(CANDIDATE)
            .unwrap();

        assert_eq!(
            ed.received,
            vec![EditPayload::Lines(vec!["LE HAMEAU".into(), "75011 PARIS".into()])]
        );
        assert_eq!(out.lines(), ["M. Jean Dupont", "LE HAMEAU NORD", "75011 PARIS"]);
    }

    #[test]
    fn threshold_is_configurable() {
        let api = FakeApi::new(&[("x", "c1")]).with_detail("c1", "", &["75011 PARIS"]);
        let mut op = Scripted::new(&["y", "y"]);
        let mut ed = RecordingEditor::replying("");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .lieu_dit_min_query_lines(2)
            .correct(CANDIDATE)
            .unwrap();
        assert_eq!(out.lines()[1], "12 RUE DES LILAS");
    }

    #[test]
    fn candidate_without_marker_is_reviewed_manually() {
        let candidate = "John Smith\n10 Downing St\nLondon SW1A 2AA\nUNITED KINGDOM";
        let api = FakeApi::new(&[("unused", "c1")]);
        let mut op = Scripted::new(&[]);
        let mut ed = RecordingEditor::replying("John Smith\n10 Downing Street\nLondon SW1A 2AA");
        let out = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .finalize(candidate)
            .unwrap();

        assert_eq!(ed.received, vec![EditPayload::Text(candidate.to_string())]);
        assert!(api.queries.borrow().is_empty());
        assert_eq!(out.lines().len(), 3);
    }

    #[test]
    fn candidate_is_not_mutated() {
        let api = FakeApi::new(&[("x", "c1")]).with_detail("c1", "", &["12 RUE DES LILAS"]);
        let mut op = Scripted::new(&["y"]);
        let mut ed = RecordingEditor::replying("");
        let candidate = CANDIDATE.to_string();
        let _ = AddressCorrection::new(Some(&api), &mut op, &mut ed)
            .finalize(&candidate)
            .unwrap();
        assert_eq!(candidate, CANDIDATE);
    }
}

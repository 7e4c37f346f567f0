//! Pipeline stages for turning a letter into an envelope-ready PDF.
//!
//! Each submodule implements one step and can be tested on its own: the
//! layout and search stages work on plain [`layout::DocumentLayout`] values,
//! and the correction stage talks to its collaborators through traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ extract ◀──▶ search ──▶ correct ──▶ render
//! (path)    (pdfium)   (skip k)     (regex)    (La Poste)   (window + merge)
//! ```
//!
//! 1. [`input`]   : validate the PDF path and derive the output path
//! 2. [`layout`]  : group positioned text runs into lines and text boxes
//! 3. [`extract`] : select the box containing, following or preceding the
//!    anchor string, `skip` boxes further away
//! 4. [`search`]  : retry the extractor with growing `skip` until the
//!    validation regex accepts a candidate
//! 5. [`correct`] : normalise the address against the reference API, with
//!    operator confirmation and manual editing
//! 6. [`render`]  : print the address on an A4 window page and append it to
//!    the source document

pub mod correct;
pub mod extract;
pub mod input;
pub mod layout;
pub mod render;
pub mod search;

//! Configuration for a pdf-envelope run.
//!
//! Everything the pipeline needs is carried by one [`EnvelopeConfig`] value,
//! deserialised from `config.json` or assembled with [`EnvelopeConfigBuilder`],
//! then handed explicitly to each component. Unknown keys are ignored and
//! missing ones fall back to the defaults documented on each field.
//!
//! Two pieces live outside the JSON file:
//! * the validation regex, read from `regex.txt` only when `use_regex` is set
//!   (see [`load_validator`]);
//! * the address-service key, read from `OKAPI_API_KEY` after `.env` has been
//!   loaded (see [`load_dotenv`] and [`crate::api::ApiKey::from_env`]).
//!
//! # Example
//! ```rust
//! use pdf_envelope::config::EnvelopeConfig;
//! use pdf_envelope::pipeline::extract::ExtractionStrategy;
//!
//! let config = EnvelopeConfig::builder()
//!     .search_string("Réf. client")
//!     .extraction_type(ExtractionStrategy::Following)
//!     .use_regex(true)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.search.max_skip, 5);
//! ```

use crate::api::DEFAULT_BASE_URL;
use crate::error::EnvelopeError;
use crate::pipeline::extract::ExtractionStrategy;
use crate::pipeline::layout::LayoutParams;
use crate::pipeline::search::{CandidateValidator, MAX_SKIP};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default lookup-query length from which a missing lieu-dit is synthesised
/// from the first query line.
pub const LIEU_DIT_MIN_QUERY_LINES: usize = 3;

/// A4 in millimetres; the window must fit on it.
const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;

/// Full configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Which box relative to the anchor holds the address. Default: `following`.
    pub extraction_type: ExtractionStrategy,

    /// Substring that identifies the anchor box. Required, case-sensitive.
    pub search_string: String,

    /// Validate candidates against `regex.txt`. Default: false.
    ///
    /// Without validation the search loop stops after its first attempt.
    pub use_regex: bool,

    /// Draw a light frame around the printed address. Default: false.
    pub show_window_border: bool,

    pub font: FontConfig,

    pub display: DisplayConfig,

    /// Marker that makes a candidate eligible for automatic correction.
    /// Default: `"FRANCE"`.
    pub locale_marker: String,

    pub search: SearchConfig,

    pub correction: CorrectionConfig,

    pub edit: EditConfig,

    /// Text-grouping thresholds used when reading the PDF layout.
    pub layout: LayoutParams,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            extraction_type: ExtractionStrategy::default(),
            search_string: String::new(),
            use_regex: false,
            show_window_border: false,
            font: FontConfig::default(),
            display: DisplayConfig::default(),
            locale_marker: "FRANCE".to_string(),
            search: SearchConfig::default(),
            correction: CorrectionConfig::default(),
            edit: EditConfig::default(),
            layout: LayoutParams::default(),
        }
    }
}

/// Font used for the address lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Font name. Without `path`, one of the standard PDF fonts
    /// (`Helvetica`, `Times-Roman`, `Courier` and their bold variants).
    pub name: String,
    /// Size in points. Default: 12.
    pub size: f32,
    /// `#RRGGBB` or one of `black`, `white`, `gray`, `red`, `green`, `blue`.
    pub color: String,
    /// TrueType file to embed instead of a standard font.
    pub path: Option<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            name: "Helvetica".to_string(),
            size: 12.0,
            color: "#000000".to_string(),
            path: None,
        }
    }
}

impl FontConfig {
    /// Parse `color` into RGB components.
    pub fn rgb(&self) -> Result<(u8, u8, u8), EnvelopeError> {
        parse_color(&self.color).ok_or_else(|| {
            EnvelopeError::InvalidConfig(format!("font.color: unrecognised colour {:?}", self.color))
        })
    }
}

fn parse_color(s: &str) -> Option<(u8, u8, u8)> {
    let s = s.trim();
    let named = match s.to_ascii_lowercase().as_str() {
        "black" => Some((0, 0, 0)),
        "white" => Some((255, 255, 255)),
        "gray" | "grey" => Some((128, 128, 128)),
        "red" => Some((255, 0, 0)),
        "green" => Some((0, 128, 0)),
        "blue" => Some((0, 0, 255)),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Position of the envelope window on an A4 page, in millimetres.
///
/// The window's right edge sits `margin_right` from the page's right edge and
/// its top edge `margin_top` from the page's top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub margin_top: f32,
    pub margin_right: f32,
    pub width: f32,
    pub height: f32,
    /// Baseline-to-baseline distance in points. Default: 14.
    pub line_height: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        // DL window envelope, window on the right.
        Self {
            margin_top: 50.0,
            margin_right: 20.0,
            width: 90.0,
            height: 45.0,
            line_height: 14.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Highest `skip` tried by the candidate search. Default: 5.
    pub max_skip: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_skip: MAX_SKIP }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Queries with at least this many lines get a synthesised lieu-dit when
    /// the service returns none. Default: 3.
    pub lieu_dit_min_query_lines: usize,
    pub api_base_url: String,
    /// Per-request timeout. Default: 10.
    pub api_timeout_secs: u64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            lieu_dit_min_query_lines: LIEU_DIT_MIN_QUERY_LINES,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_timeout_secs: 10,
        }
    }
}

impl CorrectionConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Editor command line, split on whitespace; the file path is appended.
    /// When unset the platform editor is used.
    pub editor: Option<String>,
    /// How often the edited file is checked for changes. Default: 1000.
    pub poll_interval_ms: u64,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            editor: None,
            poll_interval_ms: 1000,
        }
    }
}

impl EditConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl EnvelopeConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> EnvelopeConfigBuilder {
        EnvelopeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, EnvelopeError> {
        let raw = fs::read_to_string(path).map_err(|source| EnvelopeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)
            .map_err(|e| EnvelopeError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| EnvelopeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints the pipeline relies on.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        let invalid = |msg: String| Err(EnvelopeError::InvalidConfig(msg));

        if self.search_string.is_empty() {
            return invalid("search_string must not be empty".into());
        }
        if !(self.font.size > 0.0) {
            return invalid(format!("font.size must be > 0, got {}", self.font.size));
        }
        self.font.rgb()?;

        let d = &self.display;
        if !(d.width > 0.0 && d.height > 0.0 && d.line_height > 0.0) {
            return invalid("display.width, display.height and display.line_height must be > 0".into());
        }
        if d.margin_top < 0.0 || d.margin_right < 0.0 {
            return invalid("display margins must be >= 0".into());
        }
        if d.margin_right + d.width > A4_WIDTH_MM || d.margin_top > A4_HEIGHT_MM {
            return invalid(format!(
                "window ({} mm wide, {} mm from the right, {} mm from the top) does not fit on A4",
                d.width, d.margin_right, d.margin_top
            ));
        }

        if self.correction.api_timeout_secs == 0 {
            return invalid("correction.api_timeout_secs must be >= 1".into());
        }
        if self.correction.lieu_dit_min_query_lines == 0 {
            return invalid("correction.lieu_dit_min_query_lines must be >= 1".into());
        }
        if self.edit.poll_interval_ms == 0 {
            return invalid("edit.poll_interval_ms must be >= 1".into());
        }
        if matches!(&self.edit.editor, Some(e) if e.trim().is_empty()) {
            return invalid("edit.editor must not be blank".into());
        }
        Ok(())
    }
}

/// Builder for [`EnvelopeConfig`].
#[derive(Debug)]
pub struct EnvelopeConfigBuilder {
    config: EnvelopeConfig,
}

impl EnvelopeConfigBuilder {
    pub fn extraction_type(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.extraction_type = strategy;
        self
    }

    pub fn search_string(mut self, s: impl Into<String>) -> Self {
        self.config.search_string = s.into();
        self
    }

    pub fn use_regex(mut self, v: bool) -> Self {
        self.config.use_regex = v;
        self
    }

    pub fn show_window_border(mut self, v: bool) -> Self {
        self.config.show_window_border = v;
        self
    }

    pub fn font(mut self, font: FontConfig) -> Self {
        self.config.font = font;
        self
    }

    pub fn display(mut self, display: DisplayConfig) -> Self {
        self.config.display = display;
        self
    }

    pub fn locale_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.locale_marker = marker.into();
        self
    }

    pub fn max_skip(mut self, n: usize) -> Self {
        self.config.search.max_skip = n;
        self
    }

    pub fn lieu_dit_min_query_lines(mut self, n: usize) -> Self {
        self.config.correction.lieu_dit_min_query_lines = n;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.correction.api_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.correction.api_timeout_secs = secs;
        self
    }

    pub fn editor(mut self, command: impl Into<String>) -> Self {
        self.config.edit.editor = Some(command.into());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.edit.poll_interval_ms = ms;
        self
    }

    pub fn layout(mut self, params: LayoutParams) -> Self {
        self.config.layout = params;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EnvelopeConfig, EnvelopeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Load the validation regex from `path` when `use_regex` is set.
///
/// A missing file is created empty, and an empty pattern accepts every
/// candidate. Returns `None` when validation is disabled.
pub fn load_validator(
    path: &Path,
    use_regex: bool,
) -> Result<Option<CandidateValidator>, EnvelopeError> {
    if !use_regex {
        return Ok(None);
    }

    let pattern = match fs::read_to_string(path) {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found; creating an empty pattern file", path.display());
            fs::write(path, "").map_err(|source| EnvelopeError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
            String::new()
        }
        Err(source) => {
            return Err(EnvelopeError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let validator = CandidateValidator::new(&pattern).map_err(|e| EnvelopeError::InvalidRegex {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!("Validation regex: {:?}", validator.pattern());
    Ok(Some(validator))
}

/// Load `.env` from the working directory or its ancestors, if present.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) => {
            debug!("No .env loaded: {}", e);
            None
        }
    }
}

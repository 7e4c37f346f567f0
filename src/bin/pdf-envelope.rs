//! CLI binary for pdf-envelope.
//!
//! A thin shim over the library crate: loads `config.json`, `regex.txt` and
//! `.env`, binds pdfium, runs the pipeline and reports the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_envelope::config::{load_dotenv, load_validator};
use pdf_envelope::pipeline::input;
use pdf_envelope::pipeline::layout::{LayoutSource, PdfiumLayoutSource};
use pdf_envelope::run::dump_layout;
use pdf_envelope::{
    bind_pdfium, AddressApi, ApiKey, ConsoleOperator, EnvelopeConfig, LaPosteClient,
    ManualEditStation, Pipeline, PipelineProgressCallback, ProgressCallback, RunOutcome,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

/// Exit status when no acceptable address was found.
const NO_CANDIDATE_STATUS: u8 = 2;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal feedback: one line per search attempt, a spinner while a lookup
/// is in flight. No spinner runs while the operator is being asked something.
struct CliProgressCallback {
    spinner: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spinner: Mutex::new(None),
        })
    }

    fn start_spinner(&self, message: String) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(old) = slot.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_search_attempt(&self, skip: usize, accepted: bool) {
        let mark = if accepted { green("✓") } else { red("✗") };
        eprintln!("  {} skip {}", mark, skip);
    }

    fn on_candidate_found(&self, skip: usize, text: &str) {
        let lines = text.lines().count();
        eprintln!(
            "{} candidate found at skip {}  {}",
            green("✔"),
            skip,
            dim(&format!("{lines} line(s)"))
        );
    }

    fn on_lookup_start(&self, what: &str) {
        self.start_spinner(format!("Address service: {what}…"));
    }

    fn on_lookup_complete(&self, _what: &str) {
        self.stop_spinner();
    }

    fn on_edit_waiting(&self, path: &Path) {
        eprintln!(
            "{} Edit the address and save it: {}",
            bold("✎"),
            dim(&path.display().to_string())
        );
    }

    fn on_edit_complete(&self) {
        eprintln!("{} Processed modifications", green("✔"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Append a window page to letter.pdf → letter_merged.pdf
  pdf-envelope letter.pdf

  # Show the text boxes pdfium sees, to tune search_string/extraction_type
  pdf-envelope --dump-boxes letter.pdf

  # Print the finalized address without writing any PDF
  pdf-envelope --dry-run letter.pdf

  # Skip the La Poste lookup
  pdf-envelope --no-correct letter.pdf

FILES:
  config.json   extraction settings, font and window geometry
  regex.txt     validation pattern (verbose mode), used when use_regex is true;
                created empty on first use
  .env          may define OKAPI_API_KEY

ENVIRONMENT VARIABLES:
  OKAPI_API_KEY     La Poste "Contrôle adresse" API key (≥ 10 characters);
                    without it, addresses are printed as found
  PDFIUM_LIB_PATH   Path to libpdfium (otherwise next to the executable,
                    the working directory, then the system search path)
  RUST_LOG          Override the log filter
"#;

/// Reprint a letter's recipient address at the window position of an envelope.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-envelope",
    version,
    about = "Append a window-envelope address page to a letter PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Letter PDF.
    input: PathBuf,

    /// Configuration file.
    #[arg(short, long, env = "PDF_ENVELOPE_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Validation regex file.
    #[arg(long, env = "PDF_ENVELOPE_REGEX", default_value = "regex.txt")]
    regex: PathBuf,

    /// Merged PDF path (default: <stem>_merged.pdf next to the input).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the text boxes of every page and exit.
    #[arg(long)]
    dump_boxes: bool,

    /// Use the extracted address as is, without the address service.
    #[arg(long)]
    no_correct: bool,

    /// Stop after the address is finalized; write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Disable progress output.
    #[arg(long, env = "PDF_ENVELOPE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_ENVELOPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the address.
    #[arg(short, long, env = "PDF_ENVELOPE_QUIET")]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    load_dotenv();

    let config = EnvelopeConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let pdfium = bind_pdfium().context("Failed to bind the PDF engine")?;

    // ── Dump mode ────────────────────────────────────────────────────────
    if cli.dump_boxes {
        let path = input::resolve_local(&cli.input)?;
        let layout = PdfiumLayoutSource::new(&pdfium, config.layout)
            .load(&path)
            .context("Failed to read the PDF layout")?;
        print!("{}", dump_layout(&layout));
        return Ok(ExitCode::SUCCESS);
    }

    let validator = load_validator(&cli.regex, config.use_regex)?;

    let client = if cli.no_correct {
        None
    } else {
        match ApiKey::from_env() {
            Some(key) => Some(LaPosteClient::new(
                key,
                &config.correction.api_base_url,
                config.correction.api_timeout(),
            )?),
            None => {
                warn!("OKAPI_API_KEY missing or too short; addresses will not be corrected");
                None
            }
        }
    };

    let progress: ProgressCallback = if show_progress {
        CliProgressCallback::new()
    } else {
        pdf_envelope::progress::noop()
    };

    let mut operator = ConsoleOperator::stdio();
    let mut editor = ManualEditStation::from_config(&config.edit).progress(progress.clone());

    // ── Run ──────────────────────────────────────────────────────────────
    let outcome = Pipeline::new(&config, &mut operator, &mut editor)
        .validator(validator)
        .api(client.as_ref().map(|c| c as &dyn AddressApi))
        .progress(progress)
        .skip_correction(cli.no_correct)
        .dry_run(cli.dry_run)
        .output(cli.output.clone())
        .process(&pdfium, &cli.input)
        .context("Processing failed")?;

    let status = exit_status(&outcome);
    match outcome {
        RunOutcome::Merged {
            output, address, ..
        } => {
            println!("{}", address);
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), bold(&output.display().to_string()));
            }
        }
        RunOutcome::Finalized { address, .. } => {
            println!("{}", address);
        }
        RunOutcome::NoCandidate {
            attempts,
            last_failure,
        } => {
            eprintln!(
                "{} No acceptable address after {} attempt(s).",
                red("✘"),
                attempts
            );
            if let Some(failure) = last_failure {
                eprintln!("  {}", failure);
            }
            eprintln!(
                "  Check search_string / extraction_type in {} and the pattern in {}.\n  \
                 Run with --dump-boxes to see the text boxes.",
                cli.config.display(),
                cli.regex.display()
            );
        }
    }

    Ok(ExitCode::from(status))
}

/// Process status for a finished run; exhausting the search is not a crash.
fn exit_status(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::NoCandidate { .. } => NO_CANDIDATE_STATUS,
        RunOutcome::Merged { .. } | RunOutcome::Finalized { .. } => 0,
    }
}

//! CLI binary for pdf-freezer.
//!
//! A thin shim over [`FreezerApp`]: maps flags to [`ProcessOverrides`],
//! drives the counter and settings operations, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_freezer::{
    default_data_dir, CancelSignal, CompressionTier, FontSource, FreezeProgressCallback,
    FreezeReport, FreezerApp, OverlayCorner, ProcessOverrides,
};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress: a spinner while Ghostscript runs, then a page bar
/// while the output document is assembled. A fresh bar is drawn per file.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(ref bar) = *self.bar.lock().unwrap() {
            f(bar);
        }
    }

    /// Clear the current bar, e.g. after a failed job.
    fn clear(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl FreezeProgressCallback for CliProgressCallback {
    fn on_job_start(&self, input: &Path) {
        self.clear();
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message(format!("{}…", input.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn on_serial_issued(&self, _number: u64, label: &str) {
        self.with_bar(|bar| {
            bar.set_prefix("Rasterising");
            bar.println(format!("{} serial {}", cyan("◆"), bold(label)));
        });
    }

    fn on_pages_rasterized(&self, total_pages: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.with_bar(|bar| {
            bar.set_length(total_pages as u64);
            bar.set_style(progress_style);
            bar.set_prefix("Assembling");
        });
    }

    fn on_page_added(&self, _page_num: usize, _total_pages: usize) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_job_complete(&self, _output: &Path, _total_pages: usize) {
        self.clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Freeze one file with the saved settings (writes report_frozen.pdf)
  pdf-freezer freeze report.pdf

  # Batch, smaller output, label in the top-right corner
  pdf-freezer freeze --compression high --position top-right *.pdf

  # Hold the counter lock while the batch runs
  pdf-freezer freeze --lock a.pdf b.pdf c.pdf

  # No label, replace the input files
  pdf-freezer freeze --no-overlay --overwrite scan.pdf

  # Counter
  pdf-freezer number show
  pdf-freezer number set 1000
  pdf-freezer number unlock --force

  # Saved settings
  pdf-freezer config show
  pdf-freezer config set prefix INV
  pdf-freezer config set compression medium

COMPRESSION TIERS:
  Tier     DPI   JPEG quality
  ───────  ────  ────────────
  none     300   95  (default)
  low      200   85
  medium   150   75
  high     100   65

ENVIRONMENT VARIABLES:
  PDF_FREEZER_DIR   Data directory (settings, counter, lock, log)
  PDF_FREEZER_GS    Path to the Ghostscript executable
  RUST_LOG          Log filter, overrides --verbose/--quiet
"#;

/// Flatten PDFs into page images and stamp a serial label.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-freezer",
    version,
    about = "Flatten PDFs into page images and stamp a sequential serial label",
    long_about = "Rasterise every page of a PDF with Ghostscript and rebuild the document \
from the page images, so nothing in it can be selected or edited. The first page can carry \
a serial label (e.g. AR0042) drawn from a persisted counter.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding settings, counter and log.
    #[arg(long, global = true, env = "PDF_FREEZER_DIR")]
    data_dir: Option<PathBuf>,

    /// Append logs to this file (default: <data dir>/app.log).
    #[arg(long, global = true, env = "PDF_FREEZER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_FREEZER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF_FREEZER_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Freeze one or more PDF files, in order.
    Freeze(FreezeArgs),
    /// Check that Ghostscript is installed and runnable.
    Check,
    /// Show or change the serial counter.
    #[command(subcommand)]
    Number(NumberCommand),
    /// Show or change the saved settings.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct FreezeArgs {
    /// PDF files to freeze.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Label prefix (default: saved setting).
    #[arg(long)]
    prefix: Option<String>,

    /// Label corner: top-left, top-right, bottom-left, bottom-right.
    #[arg(long, value_parser = parse_corner)]
    position: Option<String>,

    /// Compression tier: none, low, medium, high.
    #[arg(long, value_parser = parse_tier)]
    compression: Option<String>,

    /// Output file suffix when not overwriting.
    #[arg(long)]
    suffix: Option<String>,

    /// Replace each input file with its frozen version.
    #[arg(long, conflicts_with = "suffix")]
    overwrite: bool,

    /// Do not stamp the serial label.
    #[arg(long)]
    no_overlay: bool,

    /// Kill Ghostscript if one file takes longer than this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Hold the counter lock for the whole batch.
    #[arg(long)]
    lock: bool,

    /// TrueType font for the label (default: built-in Courier).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Print one JSON report per file on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_FREEZER_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum NumberCommand {
    /// Print the number the next job will receive.
    Show,
    /// Make the next job receive N.
    Set {
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        next: u64,
    },
    /// Remove a stale counter lock.
    Unlock {
        /// Remove the lock even if another process may hold it.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the saved settings as JSON.
    Show,
    /// Change one setting.
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ConfigKey {
    Prefix,
    Overlay,
    Position,
    Compression,
    Suffix,
    Overwrite,
}

fn parse_corner(s: &str) -> Result<String, String> {
    if OverlayCorner::ALL.iter().any(|c| c.as_str() == s) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "expected one of: {}",
            OverlayCorner::ALL.map(OverlayCorner::as_str).join(", ")
        ))
    }
}

fn parse_tier(s: &str) -> Result<String, String> {
    if CompressionTier::is_known(s) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "expected one of: {}",
            CompressionTier::ALL.map(CompressionTier::as_str).join(", ")
        ))
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => bail!("Expected true/false, got '{other}'"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO output on stderr; the log file always
    // gets the full INFO stream.
    let show_progress = match &cli.command {
        Command::Freeze(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    init_logging(&cli, &data_dir, show_progress);

    let app = FreezerApp::open(&data_dir);

    match cli.command {
        Command::Freeze(ref args) => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut app = app;
            if let Some(ref path) = args.font {
                app = app.with_font(FontSource::File(path.clone()));
            }
            if let Some(ref cb) = progress {
                app = app.with_progress(Arc::clone(cb) as Arc<dyn FreezeProgressCallback>);
            }
            run_freeze(&app, args, cli.quiet, progress.as_deref()).await
        }
        Command::Check => {
            app.check_dependencies()
                .await
                .context("Ghostscript is not available")?;
            if !cli.quiet {
                eprintln!("{} Ghostscript ready", green("✔"));
            }
            Ok(())
        }
        Command::Number(cmd) => run_number(&app, cmd),
        Command::Config(cmd) => run_config(&app, cmd),
    }
}

fn init_logging(cli: &Cli, data_dir: &Path, show_progress: bool) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| data_dir.join("app.log"));
    let file = log_path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&log_path));

    let (file_layer, file_error) = match file {
        Ok(f) => {
            let file_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(f))
                .with_filter(file_filter);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(
            "Cannot open log file {}: {e}; logging to stderr only",
            log_path.display()
        );
    }
}

async fn run_freeze(
    app: &FreezerApp,
    args: &FreezeArgs,
    quiet: bool,
    progress: Option<&CliProgressCallback>,
) -> Result<()> {
    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let overrides = ProcessOverrides {
        overlay: args.no_overlay.then_some(false),
        prefix: args.prefix.clone(),
        position: args.position.clone(),
        suffix: args.suffix.clone(),
        overwrite: args.overwrite.then_some(true),
        compression: args.compression.clone(),
        rasterize_timeout: args.timeout.map(Duration::from_secs),
    };

    if args.lock {
        app.lock_counter()
            .context("Cannot lock the counter (another batch running? see `number unlock`)")?;
    }

    let result = freeze_batch(app, args, &overrides, &cancel, quiet, progress).await;

    if args.lock {
        if let Err(e) = app.unlock_counter() {
            eprintln!("{} failed to release counter lock: {e}", red("✘"));
        }
    }
    result
}

async fn freeze_batch(
    app: &FreezerApp,
    args: &FreezeArgs,
    overrides: &ProcessOverrides,
    cancel: &CancelSignal,
    quiet: bool,
    progress: Option<&CliProgressCallback>,
) -> Result<()> {
    let mut failed = 0usize;
    let total = args.inputs.len();

    for input in &args.inputs {
        let outcome = app.process_file(input, overrides, cancel).await;
        if let Some(p) = progress {
            p.clear();
        }

        match outcome {
            Ok(report) => {
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string(&report).context("Failed to serialise report")?
                    );
                }
                if !quiet {
                    print_report(&report);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}  {}", red("✘"), input.display(), red(&e.to_string()));
                if cancel.is_cancelled() {
                    eprintln!("{} batch interrupted", cyan("⚠"));
                    break;
                }
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} files failed");
    }
    Ok(())
}

fn print_report(report: &FreezeReport) {
    let label = if report.labelled {
        bold(&report.label)
    } else {
        dim(&format!("{} (not stamped)", report.label))
    };
    eprintln!(
        "{}  {}  {} pages  {}  →  {}",
        green("✔"),
        label,
        report.pages,
        dim(&format!("{:.1}s", report.total_ms as f64 / 1000.0)),
        bold(&report.output.display().to_string()),
    );
}

fn run_number(app: &FreezerApp, cmd: NumberCommand) -> Result<()> {
    match cmd {
        NumberCommand::Show => {
            let next = app.current_number().context("Failed to read counter")?;
            let locked = app.is_counter_locked().unwrap_or(false);
            println!("{next}");
            if locked {
                eprintln!("{} counter is locked", cyan("⚠"));
            }
        }
        NumberCommand::Set { next } => {
            app.set_number_override(next)
                .context("Failed to set counter")?;
            eprintln!("{} next serial will be {}", green("✔"), bold(&next.to_string()));
        }
        NumberCommand::Unlock { force } => {
            if !app.is_counter_locked().context("Failed to inspect counter")? {
                eprintln!("{} counter is not locked", dim("·"));
                return Ok(());
            }
            if !force {
                bail!(
                    "Counter is locked, possibly by a running batch; \
                     pass --force to remove the lock"
                );
            }
            app.force_unlock_counter()
                .context("Failed to remove counter lock")?;
            eprintln!("{} counter lock removed", green("✔"));
        }
    }
    Ok(())
}

fn run_config(app: &FreezerApp, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let json = serde_json::to_string_pretty(&app.settings())
                .context("Failed to serialise settings")?;
            println!("{json}");
        }
        ConfigCommand::Set { key, value } => {
            let result = match key {
                ConfigKey::Prefix => app.set_prefix(&value),
                ConfigKey::Overlay => app.set_overlay(parse_bool(&value)?),
                ConfigKey::Position => {
                    parse_corner(&value).map_err(anyhow::Error::msg)?;
                    app.set_overlay_position(&value)
                }
                ConfigKey::Compression => {
                    parse_tier(&value).map_err(anyhow::Error::msg)?;
                    app.set_compression_level(&value)
                }
                ConfigKey::Suffix => app.set_file_suffix(&value),
                ConfigKey::Overwrite => app.set_overwrite_mode(parse_bool(&value)?),
            };
            result.context("Failed to save settings")?;
            eprintln!("{} {:?} updated", green("✔"), key);
        }
    }
    Ok(())
}

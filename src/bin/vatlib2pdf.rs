//! CLI binary for vatlib2pdf.
//!
//! A thin shim over the library crate: `bot` runs the Telegram front end,
//! `download` builds one PDF locally, `inspect` prints a manuscript's
//! manifest summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vatlib2pdf::{
    bot, build_pdf, inspect, validate, BotConfig, PipelineConfig, PipelineProgressCallback,
    ProgressCallback,
};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the manifest loads, then a page bar. Pages complete out of
/// order, so the bar only counts.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Resolving");
        bar.set_message("Fetching manifest…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_manifest_resolved(&self, label: &str, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{label}: {total_pages} pages"))
        ));
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>4}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Fetching");
        self.bar.reset_eta();
    }

    fn on_page_fetched(&self, _index: usize, _total_pages: usize, _bytes: usize) {
        self.bar.inc(1);
    }

    fn on_page_retry(&self, index: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} page {index} attempt {attempt} failed: {}",
            cyan("⚠"),
            dim(error)
        ));
    }

    fn on_assembly_start(&self, _total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        self.bar.set_prefix("Assembling");
        self.bar.set_message("Creating PDF…");
    }

    fn on_assembly_complete(&self, _total_pages: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the Telegram bot
  TOKEN=123456:ABC... vatlib2pdf bot

  # Download one manuscript into ./books
  vatlib2pdf download https://digi.vatlib.it/view/MSS_Vat.lat.3225 -o books

  # Show label and page count only
  vatlib2pdf inspect https://digi.vatlib.it/view/MSS_Vat.lat.3225 --json

ENVIRONMENT VARIABLES:
  TOKEN                      Telegram bot token (required for `bot`)
  PDFIUM_LIB_PATH            Directory containing the pdfium shared library
  VATLIB2PDF_WORK_DIR        Where per-request workspaces are created
  VATLIB2PDF_CONCURRENCY     Parallel page downloads per request
  RUST_LOG                   Overrides -v / -q log filtering
"#;

/// Download Digital Vatican Library manuscripts as PDF.
#[derive(Parser, Debug)]
#[command(
    name = "vatlib2pdf",
    version,
    about = "Download Digital Vatican Library manuscripts as PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "VATLIB2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "VATLIB2PDF_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Directory for per-request scratch space.
    #[arg(long, global = true, env = "VATLIB2PDF_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Parallel page downloads per request.
    #[arg(short, long, global = true, env = "VATLIB2PDF_CONCURRENCY", default_value_t = 6)]
    concurrency: usize,

    /// Retries per page after the first attempt.
    #[arg(long, global = true, env = "VATLIB2PDF_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "VATLIB2PDF_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Library root URL.
    #[arg(long, global = true, env = "VATLIB2PDF_BASE_URL",
          default_value = vatlib2pdf::config::DEFAULT_BASE_URL)]
    base_url: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram bot until interrupted.
    Bot {
        /// Bot API token.
        #[arg(long, env = "TOKEN", hide_env_values = true)]
        token: String,

        /// Bot API root.
        #[arg(long, env = "VATLIB2PDF_TELEGRAM_API",
              default_value = vatlib2pdf::config::DEFAULT_TELEGRAM_API)]
        api_base: String,

        /// Upload endpoint for finished PDFs.
        #[arg(long, env = "VATLIB2PDF_UPLOAD_ENDPOINT",
              default_value = vatlib2pdf::config::DEFAULT_UPLOAD_ENDPOINT)]
        upload_endpoint: String,

        /// Requests processed at once across all users.
        #[arg(long, env = "VATLIB2PDF_MAX_REQUESTS", default_value_t = 4)]
        max_requests: usize,
    },

    /// Download one manuscript and save its PDF.
    Download {
        /// Viewer link, e.g. https://digi.vatlib.it/view/MSS_Vat.lat.3225
        link: String,

        /// Directory to save the PDF in.
        #[arg(short, long, env = "VATLIB2PDF_OUTPUT", default_value = ".")]
        output: PathBuf,

        /// Disable progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Print a manuscript's label and page count.
    Inspect {
        /// Viewer link.
        link: String,

        /// Print the full manifest summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With a progress bar on screen only errors are logged.
    let show_progress = matches!(cli.command, Command::Download { no_progress: false, .. })
        && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bar = show_progress.then(CliProgressCallback::new);
    let progress = bar
        .clone()
        .map(|cb| cb as Arc<dyn PipelineProgressCallback>);
    let config = build_config(&cli.pipeline, progress)?;

    match cli.command {
        Command::Bot {
            token,
            api_base,
            upload_endpoint,
            max_requests,
        } => {
            let mut bot_config = BotConfig::new(token).context("Invalid bot configuration")?;
            bot_config.api_base = api_base;
            bot_config.upload_endpoint = upload_endpoint;
            bot_config.max_concurrent_requests = max_requests;
            bot::run(&bot_config, config).await.context("Bot stopped")?;
        }

        Command::Download { link, output, .. } => {
            let link = validate(&link, &config.base_url)?;
            let outcome = build_pdf(&link, &local_requester(), &config, &output).await;
            if let Some(ref bar) = bar {
                bar.bar.finish_and_clear();
            }
            let outcome = outcome.context("Download failed")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} pages  {}ms  →  {}",
                    green("✔"),
                    outcome.page_count,
                    outcome.total_duration_ms,
                    bold(&outcome.receipt.location),
                );
            }
        }

        Command::Inspect { link, json } => {
            let link = validate(&link, &config.base_url)?;
            let manifest = inspect(&link, &config)
                .await
                .context("Failed to resolve manifest")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&manifest)
                        .context("Failed to serialise manifest")?
                );
            } else {
                println!("Link:   {}", link);
                println!("Label:  {}", manifest.label);
                println!("Pages:  {}", manifest.pages.len());
            }
        }
    }

    Ok(())
}

/// Workspace key for a local download. Distinct per process, so two CLI
/// runs sharing a work directory never share scratch space.
fn local_requester() -> String {
    format!("local-{}", std::process::id())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .base_url(args.base_url.clone())
        .concurrency(args.concurrency)
        .max_retries(args.max_retries)
        .request_timeout_secs(args.timeout)
        .work_dir(args.work_dir.clone());

    if let Some(ref dir) = args.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

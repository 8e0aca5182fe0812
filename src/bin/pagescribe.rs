//! CLI binary for pagescribe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the extracted text or JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagescribe::{
    extract_path, inspect, ExtractionConfig, ExtractionMethod, ExtractionProgressCallback,
    PreprocessConfig, ProgressCallback, StrategyKind,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_document_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total: usize, method: ExtractionMethod, confidence: f32) {
        let elapsed = self.elapsed_secs(page);
        let conf = format!("{confidence:>5.1}%");
        let conf = if confidence < 60.0 { yellow(&conf) } else { dim(&conf) };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<6}  {}  {}",
            green("✓"),
            page,
            total,
            method,
            conf,
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, error: &str) {
        let elapsed = self.elapsed_secs(page);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} pages extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text layer when present, OCR otherwise (stdout)
  pagescribe scan.pdf

  # A photo of a handwritten note, with the vision fallback
  pagescribe --vision note.jpg -o note.txt

  # OCR only, German, every page through tesseract
  pagescribe --strategies ocr --language deu brief.pdf

  # Vision only, with a custom instruction
  pagescribe --strategies vision --vision --prompt-file prompt.txt form.png

  # Full structured result with per-word confidence
  pagescribe --json scan.pdf > scan.json

  # Metadata only (no OCR, no API key)
  pagescribe --inspect-only scan.pdf

STRATEGIES:
  direct   Embedded PDF text layer. Exact; used when it passes a quality check.
  ocr      Render, clean up (grayscale, denoise, threshold, deskew) and run tesseract.
  vision   Send the rendered page to a vision model. Opt-in with --vision.

  Pages try strategies in order and stop at the first confident result.
  A vision result replaces an OCR result only when it is clearly more confident.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH                      Path to libpdfium (file or directory)
  OPENAI_API_KEY / ANTHROPIC_API_KEY   Vision provider credentials
  EDGEQUAKE_LLM_PROVIDER               Override vision provider
  EDGEQUAKE_MODEL                      Override vision model
  PAGESCRIBE_TRANSCRIPTION_PROMPT      Vision instruction text
  PAGESCRIBE_TRANSCRIPTION_PROMPT_FILE File holding the vision instruction
  RUST_LOG                             Log filter (e.g. pagescribe=debug)
"#;

/// Extract searchable text from scans, photos and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pagescribe",
    version,
    about = "Extract searchable text with per-word confidence from scans, photos and PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (PDF or image).
    input: String,

    /// Write the output to this file instead of stdout.
    #[arg(short, long, env = "PAGESCRIBE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the full DocumentResult as JSON instead of plain text.
    #[arg(long, env = "PAGESCRIBE_JSON")]
    json: bool,

    /// Print document metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Strategy order, comma-separated: direct, ocr, vision.
    #[arg(long, env = "PAGESCRIBE_STRATEGIES", default_value = "direct,ocr,vision")]
    strategies: String,

    /// Enable the vision-model fallback.
    #[arg(long, env = "PAGESCRIBE_VISION")]
    vision: bool,

    /// Confidence below which a page is offered to later strategies (0–100).
    #[arg(long, env = "PAGESCRIBE_VISION_THRESHOLD", default_value_t = 60.0)]
    vision_threshold: f32,

    /// Points a later result must gain to replace an earlier one.
    #[arg(long, env = "PAGESCRIBE_MIN_IMPROVEMENT", default_value_t = 10.0)]
    min_improvement: f32,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4o).
    #[arg(long, env = "PAGESCRIBE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PAGESCRIBE_PROVIDER")]
    provider: Option<String>,

    /// Text file holding the vision transcription instruction.
    #[arg(long, env = "PAGESCRIBE_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "PAGESCRIBE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language(s), e.g. eng or eng+deu.
    #[arg(short, long, env = "PAGESCRIBE_LANGUAGE", default_value = "eng")]
    language: String,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "PAGESCRIBE_PSM", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// Words below this confidence are flagged low-confidence (0–100).
    #[arg(long, env = "PAGESCRIBE_CONFIDENCE_FLOOR", default_value_t = 40.0)]
    confidence_floor: f32,

    /// Skip image clean-up before OCR.
    #[arg(long, env = "PAGESCRIBE_NO_PREPROCESS")]
    no_preprocess: bool,

    /// Pages processed at the same time.
    #[arg(long, env = "PAGESCRIBE_PAGE_CONCURRENCY", default_value_t = 1)]
    page_concurrency: usize,

    /// Concurrent tesseract processes (default: CPU count).
    #[arg(long, env = "PAGESCRIBE_OCR_WORKERS")]
    ocr_workers: Option<usize>,

    /// Per-page, per-strategy timeout in seconds.
    #[arg(long, env = "PAGESCRIBE_PAGE_TIMEOUT", default_value_t = 120)]
    page_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAGESCRIBE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGESCRIBE_PASSWORD")]
    password: Option<String>,

    /// Disable progress bar.
    #[arg(long, env = "PAGESCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGESCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGESCRIBE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect document")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", meta.page_count);
            if !meta.pdf_version.is_empty() {
                println!("PDF Version:  {}", meta.pdf_version);
            }
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let result = extract_path(&cli.input, &config)
        .await
        .with_context(|| format!("Extraction failed for {}", cli.input))?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&result).context("Failed to serialise output")?
    } else {
        result.full_text.clone()
    };

    match cli.output {
        Some(ref path) => {
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, rendered.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            tokio::fs::rename(&tmp, path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet {
        let s = &result.stats;
        eprintln!(
            "{} pages  method {}  confidence {:.1}%  {}ms  {}",
            result.page_count,
            bold(result.method.as_str()),
            result.overall_confidence,
            s.total_duration_ms,
            dim(&format!(
                "direct {} / ocr {} / vision {} / failed {}",
                s.direct_pages, s.ocr_pages, s.vision_pages, s.failed_pages
            )),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let prompt = match cli.prompt_file {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        None => None,
    };

    let strategies: Vec<StrategyKind> =
        StrategyKind::parse_list(&cli.strategies).context("Invalid --strategies")?;

    let preprocess = PreprocessConfig {
        enabled: !cli.no_preprocess,
        ..PreprocessConfig::default()
    };

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .strategies(strategies)
        .page_concurrency(cli.page_concurrency)
        .page_timeout_secs(cli.page_timeout)
        .download_timeout_secs(cli.download_timeout)
        .ocr_language(cli.language.clone())
        .confidence_floor(cli.confidence_floor)
        .preprocess(preprocess)
        .vision_fallback(cli.vision)
        .vision_threshold(cli.vision_threshold);

    if let Some(n) = cli.ocr_workers {
        builder = builder.ocr_workers(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(p) = prompt {
        builder = builder.transcription_prompt(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    // Fields the builder has no setters for.
    config.ocr.page_segmentation_mode = cli.psm;
    config.vision.min_improvement = cli.min_improvement.max(0.0);
    config.vision.model = cli.model.clone();
    config.vision.provider_name = cli.provider.clone();

    Ok(config)
}

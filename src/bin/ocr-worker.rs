//! CLI binary for ocr-worker.
//!
//! A thin shim over the library crate: maps flags to `HandlerConfig`, then
//! feeds jobs to the handler from a file, stdin lines, or an HTTP endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ocr_worker::{
    poll, run_lines, Handler, HandlerConfig, HttpJobSource, ModelSpec, OcrsModels,
    TesseractConfig,
};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Handle a single job from a file
  ocr-worker run --job job.json

  # Pipe a job through stdin
  echo '{"id":"1","input":{"prompt":"ping"}}' | ocr-worker run --job -

  # One job per line on stdin, one reply per line on stdout
  ocr-worker --preload lines < jobs.jsonl

  # Poll a runtime for jobs
  ocr-worker poll --job-url http://runtime/job-take --result-url 'http://runtime/job-done/{job_id}'

ENVIRONMENT VARIABLES:
  MODEL_NAME                  Primary vision model id
  OCR_WORKER_FALLBACK_MODEL   Secondary vision model id
  OCR_WORKER_PROVIDER         LLM provider for both models (default: openai)
  OPENAI_API_KEY / OPENAI_BASE_URL
                              Read by the provider; point at any OpenAI-compatible server
  PDFIUM_LIB_PATH             pdfium library file or directory
  RUST_LOG                    Log filter, overrides --verbose / --quiet
"#;

/// Serverless OCR worker: images and PDFs to text.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-worker",
    version,
    about = "Serverless OCR job handler: images and PDFs through a vision model with OCR fallback",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM provider used for the vision models.
    #[arg(long, global = true, env = "OCR_WORKER_PROVIDER", default_value = "openai")]
    provider: String,

    /// Primary vision model id.
    #[arg(long, global = true, env = "MODEL_NAME")]
    model: Option<String>,

    /// Secondary vision model, tried when the primary fails to load.
    #[arg(long, global = true, env = "OCR_WORKER_FALLBACK_MODEL")]
    fallback_model: Option<String>,

    /// Prompt used when a job carries none.
    #[arg(long, global = true, env = "OCR_WORKER_PROMPT")]
    prompt: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "OCR_WORKER_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Skip the one-token request sent to each model while loading.
    #[arg(long, global = true, env = "OCR_WORKER_NO_WARM_UP")]
    no_warm_up: bool,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "OCR_WORKER_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per image.
    #[arg(long, global = true, env = "OCR_WORKER_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// PDF pages with fewer embedded characters than this are rasterised.
    #[arg(long, global = true, env = "OCR_WORKER_MIN_PAGE_CHARS", default_value_t = 50)]
    min_page_chars: usize,

    /// Render scale for rasterised PDF pages.
    #[arg(long, global = true, env = "OCR_WORKER_RENDER_SCALE", default_value_t = 2.0)]
    render_scale: f32,

    /// Max edge of a rasterised PDF page, in pixels.
    #[arg(long, global = true, env = "OCR_WORKER_MAX_RENDERED_PIXELS", default_value_t = 2400)]
    max_rendered_pixels: u32,

    /// PDF pages recognized concurrently.
    #[arg(long, global = true, env = "OCR_WORKER_PAGE_CONCURRENCY", default_value_t = 1)]
    page_concurrency: usize,

    /// pdfium library file or directory.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// ocrs text-detection model (.rten). Requires --ocrs-recognition.
    #[arg(long, global = true, env = "OCR_WORKER_OCRS_DETECTION", requires = "ocrs_recognition")]
    ocrs_detection: Option<PathBuf>,

    /// ocrs text-recognition model (.rten). Requires --ocrs-detection.
    #[arg(long, global = true, env = "OCR_WORKER_OCRS_RECOGNITION", requires = "ocrs_detection")]
    ocrs_recognition: Option<PathBuf>,

    /// Tesseract executable.
    #[arg(long, global = true, env = "OCR_WORKER_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Tesseract language pack(s).
    #[arg(long, global = true, env = "OCR_WORKER_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    /// Disable the tesseract stage.
    #[arg(long, global = true, env = "OCR_WORKER_NO_TESSERACT")]
    no_tesseract: bool,

    /// Load the model at startup instead of on the first job.
    #[arg(long, global = true, env = "OCR_WORKER_PRELOAD")]
    preload: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR_WORKER_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, global = true, env = "OCR_WORKER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle one job and print the result JSON.
    Run {
        /// Job file, or `-` for stdin.
        #[arg(long)]
        job: String,
    },
    /// Read one job per line from stdin; write one reply per line to stdout.
    Lines,
    /// Fetch jobs from an HTTP endpoint and post results back.
    Poll {
        /// URL returning the next job (204 or empty body when idle).
        #[arg(long, env = "OCR_WORKER_JOB_URL")]
        job_url: String,

        /// URL results are posted to; `{job_id}` is substituted.
        #[arg(long, env = "OCR_WORKER_RESULT_URL")]
        result_url: String,

        /// Wait between polls when no job is queued, in milliseconds.
        #[arg(long, env = "OCR_WORKER_IDLE_MS", default_value_t = 1000)]
        idle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // stdout carries results; logs always go to stderr.
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    info!("Starting worker: {:?}", config.models);
    let handler = Handler::new(config);

    if cli.preload && handler.ensure_model().await.is_none() {
        warn!("Preload failed; the first job will retry");
    }

    match cli.command {
        Command::Run { ref job } => {
            let raw = read_job(job).await?;
            let value: Value =
                serde_json::from_str(&raw).with_context(|| format!("Job {job} is not JSON"))?;
            let result = handler.handle_value(&value).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to serialise result")?
            );
        }
        Command::Lines => {
            let stats = run_lines(&handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await
                .context("Line worker failed")?;
            if stats.failed > 0 {
                warn!("{} of {} jobs failed", stats.failed, stats.handled);
            }
        }
        Command::Poll {
            ref job_url,
            ref result_url,
            idle_ms,
        } => {
            let source = HttpJobSource::new(job_url.as_str(), result_url.as_str())
                .context("Failed to build HTTP client")?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            poll(&handler, &source, Duration::from_millis(idle_ms), shutdown).await;
        }
    }

    Ok(())
}

/// Map CLI args to `HandlerConfig`.
async fn build_config(cli: &Cli) -> Result<HandlerConfig> {
    let mut builder = HandlerConfig::builder()
        .warm_up_models(!cli.no_warm_up)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .min_page_text_chars(cli.min_page_chars)
        .render_scale(cli.render_scale)
        .max_rendered_pixels(cli.max_rendered_pixels)
        .page_concurrency(cli.page_concurrency);

    for model in [&cli.model, &cli.fallback_model].into_iter().flatten() {
        builder = builder.model(ModelSpec::new(cli.provider.as_str(), model.as_str()));
    }

    if let Some(ref prompt) = cli.prompt {
        builder = builder.default_prompt(prompt.as_str());
    }
    if let Some(ref path) = cli.system_prompt {
        let system = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(system);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let (Some(detection), Some(recognition)) = (&cli.ocrs_detection, &cli.ocrs_recognition) {
        builder = builder.ocrs(OcrsModels {
            detection: detection.clone(),
            recognition: recognition.clone(),
        });
    }

    let tesseract = (!cli.no_tesseract).then(|| TesseractConfig {
        binary: cli.tesseract.clone(),
        language: cli.tesseract_lang.clone(),
    });
    builder = builder.tesseract(tesseract);

    builder.build().context("Invalid configuration")
}

async fn read_job(job: &str) -> Result<String> {
    if job == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read job from stdin")?;
        Ok(raw)
    } else {
        tokio::fs::read_to_string(job)
            .await
            .with_context(|| format!("Failed to read job file {job}"))
    }
}

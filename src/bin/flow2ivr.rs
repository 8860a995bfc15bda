//! CLI binary for edgequake-flow2ivr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_flow2ivr::{
    extract_images_from_pdf, preview, FlowError, FlowchartPipeline, PdfExtractOptions,
    PipelineConfig, ProgressCallback, ShapePolicy, Stage, StageProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner shown while a model call is in flight, with one log line per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        *self.started.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(match stage {
            Stage::ImageToNodes => "reading flowchart image…",
            Stage::NodesToActionable => "converting nodes…",
        });
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_stage_complete(&self, stage: Stage, output: &Path, items: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:<20} {:>4} nodes  →  {}  {}",
            green("✓"),
            stage.to_string(),
            items,
            bold(&output.display().to_string()),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let secs = self.elapsed_secs();
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:<20} {}  {}",
            red("✗"),
            stage.to_string(),
            red(first_line),
            dim(&format!("{secs:.1}s")),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline with the default file layout
  flow2ivr run

  # Full pipeline with explicit paths
  flow2ivr run --image charts/billing.png --template ivr_template.json \
               --nodes-output out/billing_nodes.json --actionable-output out/billing_ivr.json

  # Stage 1 only, then fix the nodes by hand, then stage 2
  flow2ivr nodes --image data/flowchart.png
  flow2ivr actionable --nodes output_jsons/flowchart_nodes.json

  # Use another edgequake-llm provider instead of Bedrock
  flow2ivr --provider openai --model-id gpt-4.1 run

  # Rasterise a PDF export into page_001.png, page_002.png, …
  flow2ivr extract-pdf data/example.pdf --output-dir extracted_images

ENVIRONMENT VARIABLES:
  AWS_BEARER_TOKEN_BEDROCK  Bearer API key for the Bedrock runtime endpoint
  AWS_REGION                Region of the Bedrock runtime endpoint (default us-east-1)
  FLOW2IVR_MODEL_ID         Model id / inference profile
  FLOW2IVR_ENDPOINT         Full messages endpoint URL (overrides region)
  FLOW2IVR_PROVIDER         edgequake-llm provider name (openai, anthropic, ollama, …)
  RUST_LOG                  Log filter, e.g. RUST_LOG=edgequake_flow2ivr=debug
"#;

/// Convert flowchart images into actionable IVR nodes using a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "flow2ivr",
    version,
    about = "Convert flowchart images into actionable IVR nodes using a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "FLOW2IVR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FLOW2IVR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FLOW2IVR_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model id, inference profile id or ARN.
    #[arg(long, global = true, env = "FLOW2IVR_MODEL_ID")]
    model_id: Option<String>,

    /// AWS region of the Bedrock runtime endpoint.
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Full messages endpoint URL; overrides the region-derived Bedrock URL.
    #[arg(long, global = true, env = "FLOW2IVR_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer API key for the messages endpoint.
    #[arg(long, global = true, env = "AWS_BEARER_TOKEN_BEDROCK", hide_env_values = true)]
    api_key: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// instead of the messages endpoint.
    #[arg(long, global = true, env = "FLOW2IVR_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, global = true, env = "FLOW2IVR_TEMPERATURE")]
    temperature: Option<f32>,

    /// Retries on transient service failures (timeouts, 429, 5xx).
    #[arg(long, global = true, env = "FLOW2IVR_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Per-call timeout in seconds. Default: wait for the service.
    #[arg(long, global = true, env = "FLOW2IVR_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Reject an actionable reply that is a single object instead of an array.
    #[arg(long, global = true, env = "FLOW2IVR_STRICT")]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run both stages: image → nodes file → actionable file.
    Run {
        #[arg(long, default_value = "data/flowchart.png")]
        image: PathBuf,
        #[arg(long, default_value = "output_jsons/flowchart_nodes.json")]
        nodes_output: PathBuf,
        #[arg(long, default_value = "output_jsons/actionable_nodes.json")]
        actionable_output: PathBuf,
        #[arg(long, default_value = "template.json")]
        template: PathBuf,
    },
    /// Stage 1 only: image → nodes file.
    Nodes {
        #[arg(long, default_value = "data/flowchart.png")]
        image: PathBuf,
        #[arg(short, long, default_value = "output_jsons/flowchart_nodes.json")]
        output: PathBuf,
    },
    /// Stage 2 only: nodes file + template → actionable file.
    Actionable {
        #[arg(long, default_value = "output_jsons/flowchart_nodes.json")]
        nodes: PathBuf,
        #[arg(long, default_value = "template.json")]
        template: PathBuf,
        #[arg(short, long, default_value = "output_jsons/actionable_nodes.json")]
        output: PathBuf,
    },
    /// Rasterise every page of a PDF into page_NNN.png files.
    ExtractPdf {
        pdf: PathBuf,
        #[arg(long, default_value = "extracted_images")]
        output_dir: PathBuf,
        /// Render resolution (72–600).
        #[arg(long, default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=600))]
        dpi: u32,
        /// Directory containing poppler's pdftoppm.
        #[arg(long, env = "FLOW2IVR_POPPLER_PATH")]
        poppler_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the spinner active only warnings and errors are logged; the
    // spinner lines carry the progress.
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

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    match &cli.command {
        Command::ExtractPdf {
            pdf,
            output_dir,
            dpi,
            poppler_path,
        } => extract_pdf(pdf, output_dir, *dpi, poppler_path.clone(), cli.quiet).await,
        command => run_pipeline(cli, command, show_progress).await,
    }
}

async fn run_pipeline(cli: &Cli, command: &Command, show_progress: bool) -> Result<()> {
    let spinner = show_progress.then(CliProgressCallback::new);
    let progress = spinner
        .clone()
        .map(|cb| cb as Arc<dyn StageProgressCallback>);
    let config = build_config(&cli.model, progress)?;
    let pipeline = FlowchartPipeline::new(&config).context("Failed to set up the pipeline")?;

    let outcome = match command {
        Command::Run {
            image,
            nodes_output,
            actionable_output,
            template,
        } => pipeline
            .process_flowchart(image, nodes_output, actionable_output, template)
            .await
            .map(|doc| ("Pipeline completed successfully!", doc.into_value())),
        Command::Nodes { image, output } => pipeline
            .process_flowchart_to_nodes_only(image, output)
            .await
            .map(|doc| ("Flowchart nodes extracted.", doc.into_value())),
        Command::Actionable {
            nodes,
            template,
            output,
        } => pipeline
            .process_nodes_to_actionable_only(nodes, template, output)
            .await
            .map(|doc| ("Actionable nodes generated.", doc.into_value())),
        Command::ExtractPdf { .. } => return Ok(()),
    };

    if let Some(ref cb) = spinner {
        cb.finish();
    }
    let (headline, value) = outcome?;

    if !cli.quiet {
        eprintln!("{} {}", green("✔"), bold(headline));
        eprintln!("{}", dim("Preview:"));
        println!("{}", preview(&value));
    }
    Ok(())
}

async fn extract_pdf(
    pdf: &Path,
    output_dir: &Path,
    dpi: u32,
    poppler_path: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let options = PdfExtractOptions {
        output_dir: output_dir.to_path_buf(),
        dpi,
        rasterizer_dir: poppler_path,
    };
    let files = extract_images_from_pdf(pdf, &options).await;
    if files.is_empty() {
        anyhow::bail!("Failed to extract images from PDF '{}'", pdf.display());
    }
    if !quiet {
        for f in &files {
            println!("{}", f.display());
        }
        eprintln!(
            "{} {} images saved to {}",
            green("✔"),
            bold(&files.len().to_string()),
            output_dir.display()
        );
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder();

    if let Some(ref id) = args.model_id {
        builder = builder.model_id(id);
    }
    if let Some(ref region) = args.region {
        builder = builder.region(region);
    }
    if let Some(ref url) = args.endpoint {
        builder = builder.endpoint(url);
    }
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref name) = args.provider {
        builder = builder.provider_name(name);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if args.strict {
        builder = builder.shape_policy(ShapePolicy::Strict);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Print the failure, with setup guidance when an input file is missing.
fn report_error(e: &anyhow::Error) {
    eprintln!("{} {:#}", red("Error:"), e);

    if let Some(FlowError::InputNotFound { .. }) = e.downcast_ref::<FlowError>() {
        eprintln!();
        eprintln!("Please ensure you have:");
        eprintln!("  1. A flowchart image at data/flowchart.png (or pass --image)");
        eprintln!("  2. A template file at template.json (or pass --template)");
        eprintln!("  3. For `actionable`, a nodes file from a previous `nodes` run (or pass --nodes)");
    }
}

//! CLI binary for usdz2glb.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `convert` runs a single remote-fetch conversion from the terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use usdz2glb::server::{self, AppState};
use usdz2glb::store::DEFAULT_GCS_ENDPOINT;
use usdz2glb::{
    ConversionOutcome, ConversionRequest, ConversionService, ConversionStep, ConverterConfig,
    GcsObjectStore, LocalObjectStore, ObjectStore, PipelineObserver, PipelineState, SharedObserver,
    ToolCommand,
};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner that follows the pipeline state and prints each tool invocation.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Validating");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineObserver for CliObserver {
    fn on_state_change(&self, _from: PipelineState, to: PipelineState) {
        let prefix = match to {
            PipelineState::Acquiring => "Fetching",
            PipelineState::Converting => "Converting",
            PipelineState::Publishing => "Publishing",
            _ => return,
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message("");
    }

    fn on_tool_started(&self, step: ConversionStep, command: &ToolCommand) {
        self.bar.set_message(command.program.clone());
        self.bar
            .println(format!("  {} {}  {}", cyan("▸"), step, dim(&command.to_string())));
    }

    fn on_finished(&self, outcome: &ConversionOutcome) {
        self.bar.finish_and_clear();
        match outcome {
            ConversionOutcome::Success(p) => eprintln!(
                "{} Published {} {}",
                green("✔"),
                p.url,
                dim(&format!("({} bytes)", p.size_bytes))
            ),
            ConversionOutcome::Failure(f) => eprintln!("{} {}", red("✘"), red(&f.to_string())),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on $PORT (default 8080), storing results on disk
  usdz2glb serve --store-root /var/lib/usdz2glb

  # Publish to Google Cloud Storage
  GCS_ACCESS_TOKEN=$(gcloud auth print-access-token) \
    usdz2glb serve --store gcs --upload-bucket converted-models

  # One-off conversion from a (signed) URL
  usdz2glb convert "https://example.com/chair.usdz?sig=abc" models furniture/chair.glb

  # Same, machine-readable outcome
  usdz2glb convert --json "https://example.com/chair.usdz" models chair.glb

HTTP ROUTES (serve):
  POST /convert                   {"inputUrl","outputBucket","outputPath"}
  POST /api/convert/usdz-to-glb   multipart/form-data, part "file"
  GET  /api/model?url=<url>       stream a remote model (CORS proxy)
  GET  /health

EXTERNAL TOOLS:
  usdcat    step 1   <input.usdz> --out <scene.usd>
  usd2gltf  step 2   --input <scene.usd> --output <model.glb>
  Both are looked up on PATH unless --usdcat / --usd2gltf give a path.
"#;

/// Convert USDZ archives to GLB and publish them to an object store.
#[derive(Parser, Debug)]
#[command(
    name = "usdz2glb",
    version,
    about = "Convert USDZ archives to GLB and publish them to an object store",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "USDZ2GLB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "USDZ2GLB_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP conversion service.
    Serve(ServeArgs),
    /// Convert one remote USDZ file and publish the result.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "USDZ2GLB_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Bucket that receives multipart-upload results.
    #[arg(long, env = "UPLOAD_BUCKET")]
    upload_bucket: Option<String>,

    /// Key prefix for multipart-upload results.
    #[arg(long, env = "USDZ2GLB_UPLOAD_PREFIX", default_value = "converted")]
    upload_prefix: String,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "USDZ2GLB_MAX_UPLOAD_MB", default_value_t = 256)]
    max_upload_mb: usize,

    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// HTTP/HTTPS URL of the .usdz file.
    input_url: String,

    /// Destination bucket.
    output_bucket: String,

    /// Destination object path, e.g. `models/chair.glb`.
    output_path: String,

    /// Print the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "USDZ2GLB_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    service: ServiceArgs,
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct ServiceArgs {
    /// Object store backend.
    #[arg(long, env = "USDZ2GLB_STORE", value_enum, default_value = "local")]
    store: StoreKind,

    /// Root directory of the local store.
    #[arg(long, env = "USDZ2GLB_STORE_ROOT", default_value = "./objects")]
    store_root: PathBuf,

    /// GCS endpoint (override for emulators).
    #[arg(long, env = "GCS_ENDPOINT", default_value = DEFAULT_GCS_ENDPOINT)]
    gcs_endpoint: String,

    /// OAuth2 access token for GCS.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    gcs_access_token: Option<String>,

    /// Step 1 program.
    #[arg(long, env = "USDCAT_BIN", default_value = "usdcat")]
    usdcat: String,

    /// Step 2 program.
    #[arg(long, env = "USD2GLTF_BIN", default_value = "usd2gltf")]
    usd2gltf: String,

    /// Directory for per-request workspaces (default: system temp dir).
    #[arg(long, env = "USDZ2GLB_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "USDZ2GLB_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StoreKind {
    Local,
    Gcs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a one-off conversion needs, so
    // library INFO logs are hidden while it is active.
    let spinner_active = matches!(
        &cli.command,
        Command::Convert(args) if !args.json && !args.no_progress
    ) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_active {
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

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Convert(args) => convert(args, spinner_active).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut builder = args
        .service
        .config_builder()
        .upload_prefix(&args.upload_prefix)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));
    match &args.upload_bucket {
        Some(bucket) => builder = builder.upload_bucket(bucket),
        None => warn!("UPLOAD_BUCKET is not set; the upload route will answer 500"),
    }
    let config = builder.build().context("Invalid configuration")?;

    let service = ConversionService::with_process_tools(config, args.service.store()?)
        .context("Failed to build conversion service")?;

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    server::serve(listener, AppState::new(service), shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn convert(args: ConvertArgs, show_progress: bool) -> Result<()> {
    let config = args
        .service
        .config_builder()
        .build()
        .context("Invalid configuration")?;
    let service = ConversionService::with_process_tools(config, args.service.store()?)
        .context("Failed to build conversion service")?;

    let request = ConversionRequest::remote(&args.input_url, &args.output_bucket, &args.output_path);
    let outcome = if show_progress {
        let observer: SharedObserver = CliObserver::new();
        service.convert_observed(request, observer).await
    } else {
        service.convert(request).await
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.to_json()).context("Failed to serialize outcome")?
        );
    }

    let published = outcome.into_result().context("Conversion failed")?;
    if !args.json && !show_progress {
        println!("{}", published.url);
    }
    Ok(())
}

impl ServiceArgs {
    fn config_builder(&self) -> usdz2glb::ConverterConfigBuilder {
        let mut builder = ConverterConfig::builder()
            .unpack_tool(&self.usdcat)
            .gltf_tool(&self.usd2gltf)
            .download_timeout_secs(self.download_timeout);
        if let Some(root) = &self.workspace_root {
            builder = builder.workspace_root(root);
        }
        builder
    }

    fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        match self.store {
            StoreKind::Local => {
                info!("Using local object store at {}", self.store_root.display());
                Ok(Arc::new(LocalObjectStore::new(&self.store_root)))
            }
            StoreKind::Gcs => {
                let client = reqwest::Client::builder()
                    .build()
                    .context("Failed to build GCS HTTP client")?;
                let mut store = GcsObjectStore::new(client, &self.gcs_endpoint);
                match &self.gcs_access_token {
                    Some(token) => store = store.with_access_token(token),
                    None => warn!("GCS_ACCESS_TOKEN is not set; uploads will be unauthenticated"),
                }
                info!("Using GCS object store at {}", self.gcs_endpoint);
                Ok(Arc::new(store))
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use receipt_normalizer::config::Config;
use receipt_normalizer::preprocessing::config::ContrastFactor;
use receipt_normalizer::{server, ConfigOverrides, Pipeline, Profile, Source};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "receipt-normalizer")]
#[command(about = "Normalize receipt photographs for OCR")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Normalize a single image file and print the output path
    Normalize(NormalizeArgs),
    /// Run the HTTP normalization server
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Image to normalize
    pub input: PathBuf,

    /// Processing profile (full-ocr, minimal-grayscale, receipt-aggressive,
    /// contrast-only, grayscale-only)
    #[arg(long, short, default_value = "full-ocr")]
    pub profile: Profile,

    /// JSON file with configuration overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write here instead of next to the input
    #[arg(long, short, conflicts_with_all = ["output_suffix", "output_extension"])]
    pub output: Option<PathBuf>,

    /// Suffix appended to the input file stem
    #[arg(long)]
    pub output_suffix: Option<String>,

    /// Extension of the written file (defaults to the input's)
    #[arg(long)]
    pub output_extension: Option<String>,

    /// Fixed contrast factor, replacing the profile's
    #[arg(long)]
    pub contrast_factor: Option<f32>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "RECEIPT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "RECEIPT_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "RECEIPT_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Profile used when a request does not name one
    #[arg(long, env = "RECEIPT_DEFAULT_PROFILE", default_value = "full-ocr")]
    pub default_profile: Profile,
}

impl From<ServeArgs> for Config {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            default_profile: args.default_profile,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for the normalize output path
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Normalize(args) => normalize(args).await,
        Command::Serve(args) => {
            let config = Config::from(args);

            tracing::info!("Starting receipt-normalizer v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Binding to {}:{}", config.host, config.port);

            server::run(config).await?;
            Ok(())
        }
    }
}

async fn normalize(args: NormalizeArgs) -> anyhow::Result<()> {
    let mut overrides = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            ConfigOverrides::from_json(&json)?
        }
        None => ConfigOverrides::default(),
    };
    if args.output_suffix.is_some() {
        overrides.output_suffix = args.output_suffix;
    }
    if args.output_extension.is_some() {
        overrides.output_extension = args.output_extension;
    }
    if let Some(factor) = args.contrast_factor {
        overrides.contrast_factor = Some(ContrastFactor::Fixed(factor));
    }

    let pipeline = Pipeline::with_overrides(args.profile, overrides)?;
    let source = Source::path(&args.input);

    let output = args.output;
    let result = tokio::task::spawn_blocking(move || match output {
        Some(path) => pipeline.normalize_to(&source, &path),
        None => pipeline.normalize(&source),
    })
        .await
        .context("Normalization task panicked")?
        .with_context(|| format!("Failed to normalize {}", args.input.display()))?;

    tracing::info!(
        "Profile {} finished in {}ms ({} steps)",
        result.profile,
        result.total_time_ms,
        result.steps.len()
    );
    println!("{}", result.destination.describe());

    Ok(())
}

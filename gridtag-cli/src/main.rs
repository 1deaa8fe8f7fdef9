use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Import from gridtag-core
use gridtag_core::{DocumentProcessor, EngineConfig};

// Import CLI utilities
use gridtag::{load_document, render, write_output, InputKind};

#[derive(Parser)]
#[command(name = "gridtag")]
#[command(about = "Structure spreadsheet grids and API payloads into tagged, searchable documents")]
struct Args {
    /// Path to the JSON input (a workbook grid export, or any payload with --api)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Treat the input as an arbitrary JSON API payload
    #[arg(long)]
    api: bool,

    /// Path to custom config file (YAML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only print blocks carrying this tag (repeatable; all must match)
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    /// Largest rows x columns a printed block may have
    #[arg(long)]
    max_cells: Option<usize>,

    /// Enable detailed profiling of all pipeline steps
    #[arg(long)]
    profile: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    show_config: bool,
}

fn main() {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("❌ Processing failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = EngineConfig::load_with_fallback(args.config.as_deref());
    match &args.config {
        Some(path) => info!("Loaded config from: {}", path),
        None => info!("Using default config"),
    }
    if let Some(max_cells) = args.max_cells {
        config.search.max_display_cells = max_cells;
    }

    if args.show_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(input) = args.input.as_deref() else {
        anyhow::bail!("--input is required unless --show-config is given");
    };
    if !input.exists() {
        anyhow::bail!("Input not found at: {}", input.display());
    }

    let max_cells = config.search.max_display_cells;
    let processor = DocumentProcessor::with_config(config)?;
    let kind = if args.api {
        InputKind::Api
    } else {
        InputKind::Workbook
    };

    info!("Processing: {}", input.display());
    let document = load_document(&processor, input, kind, args.profile)?;
    let json = render(&document, &args.tags, max_cells)?;
    write_output(&json, args.output.as_deref())
}

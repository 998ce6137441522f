//! Medallion CLI: runs Bronze/Silver/Gold jobs from YAML job files.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Medallion: declarative Bronze/Silver/Gold table refinement
#[derive(Parser, Debug)]
#[command(name = "medallion", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds medallion.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Override the data root from the settings
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run Bronze, Silver and Gold in order
    Run {
        /// Run id (defaults to the local time, YYYYMMDD_HHMMSS)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run only the Bronze layer
    Bronze {
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run only the Silver layer
    Silver {
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run only the Gold layer
    Gold {
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default medallion.toml into the workspace
    Init,
    /// Print the effective settings
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let overrides = medallion_core::SettingsOverrides {
        data_root: cli.data_root.clone(),
    };
    let mut settings = medallion_core::load_settings(Some(&workspace), Some(&overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if settings.data_root.is_relative() {
        settings.data_root = workspace.join(&settings.data_root);
    }

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let (json_layer, _guard) = if settings.logging.json {
        let log_dir = settings.logging.dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "medallion", "medallion")
                .map(|d| d.data_dir().join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        });
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "medallion.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &workspace, &settings)
}

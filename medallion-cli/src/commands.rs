//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use medallion_core::config::SETTINGS_FILE;
use medallion_core::persistence::load_yaml;
use medallion_core::{
    BronzeJob, BronzeLayer, EngineSettings, GoldJob, GoldLayer, LayerFile, LayerReport,
    ParquetStore, PipelineJobs, SilverJob, SilverLayer,
};
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    settings: &EngineSettings,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { run_id } => handle_run(settings, &resolve_run_id(run_id)),
        Commands::Bronze { run_id } => {
            let run_id = resolve_run_id(run_id);
            let jobs = load_jobs::<BronzeJob>(settings, &settings.jobs.bronze)?;
            let store = ParquetStore::new(&settings.data_root);
            let report = BronzeLayer::new(&store, &settings.data_root, &jobs).run(&run_id)?;
            print_report(&report);
            Ok(())
        }
        Commands::Silver { run_id } => {
            let run_id = resolve_run_id(run_id);
            tracing::info!(run_id = %run_id, "Silver run");
            let jobs = load_jobs::<SilverJob>(settings, &settings.jobs.silver)?;
            let store = ParquetStore::new(&settings.data_root);
            let report = SilverLayer::new(&store, &jobs).run()?;
            print_report(&report);
            Ok(())
        }
        Commands::Gold { run_id } => {
            let run_id = resolve_run_id(run_id);
            tracing::info!(run_id = %run_id, "Gold run");
            let jobs = load_jobs::<GoldJob>(settings, &settings.jobs.gold)?;
            let store = ParquetStore::new(&settings.data_root);
            let report = GoldLayer::new(&store, &jobs).run()?;
            print_report(&report);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, settings),
    }
}

/// Run ids default to the local start time.
fn resolve_run_id(run_id: Option<String>) -> String {
    run_id.unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
}

fn load_jobs<J: serde::de::DeserializeOwned>(
    settings: &EngineSettings,
    path: &Path,
) -> anyhow::Result<Vec<J>> {
    let file: LayerFile<J> = load_yaml(&settings.job_file(path))?;
    Ok(file.sources)
}

fn handle_run(settings: &EngineSettings, run_id: &str) -> anyhow::Result<()> {
    let jobs = PipelineJobs::load(
        &settings.job_file(&settings.jobs.bronze),
        &settings.job_file(&settings.jobs.silver),
        &settings.job_file(&settings.jobs.gold),
    )?;
    let store = ParquetStore::new(&settings.data_root);

    println!("Run ID: {}", run_id);
    let reports = medallion_core::run_pipeline(&store, &settings.data_root, &jobs, run_id)?;
    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &LayerReport) {
    println!("{} ({} job(s)):", report.layer, report.outcomes.len());
    for outcome in &report.outcomes {
        println!(
            "  {} -> {} ({} rows)",
            outcome.job_id,
            outcome.destination.display(),
            outcome.rows
        );
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    settings: &EngineSettings,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            std::fs::create_dir_all(workspace)?;
            let config_path = workspace.join(SETTINGS_FILE);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&EngineSettings::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(settings)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

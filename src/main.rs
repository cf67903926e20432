//! vulndb - manage the local vulnerability database
//!
//! Main entry point for the command line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use vulndb_curator::core::utils::format_file_size;
use vulndb_curator::logging::{LogLevel, LoggingConfig, LoggingSystem};
use vulndb_curator::{
    Curator, CuratorConfig, ErrorRecovery, LocalMirror, ProgressCallback, StagedProgress,
};

#[derive(Parser, Debug)]
#[command(name = "vulndb")]
#[command(about = "Install, update and validate the local vulnerability database", long_about = None)]
struct Cli {
    /// JSON configuration file (overrides defaults, overridden by VULNDB_* variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the installed database and whether it is usable.
    Status {
        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate the installed database; exits non-zero if it is unusable.
    Check,
    /// Install a newer database from a mirror directory, if one is available.
    Update {
        /// Directory holding latest.json and the archives it lists.
        #[arg(long)]
        mirror: PathBuf,
        /// Ignore the update check frequency limit.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Install a database archive (tar or tar.gz) from disk.
    Import {
        archive: PathBuf,
    },
    /// Remove the installed database.
    Delete,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let logging_config = LoggingConfig::new().with_level(LogLevel::from_verbosity(cli.verbose));
    let _logging_system = match LoggingSystem::init(logging_config) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}. Using basic logging.", e);
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::WARN.into()),
                )
                .init();
            None
        }
    };

    let config = CuratorConfig::load(cli.config.as_deref()).context("unable to load configuration")?;
    tracing::debug!(root = %config.root_dir.display(), "using database root");

    match cli.command {
        Commands::Status { json } => {
            let curator = Curator::new(config);
            let status = curator.status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Location:  {}", status.location.display());
                if let Some(built) = status.built {
                    println!("Built:     {}", built.to_rfc3339());
                }
                if let Some(schema) = &status.schema_version {
                    println!("Schema:    {}", schema);
                }
                if let Some(checksum) = &status.checksum {
                    println!("Checksum:  {}", checksum);
                }
                if let Ok(metadata) = tokio::fs::metadata(curator.config().db_file_path()).await {
                    println!("Size:      {}", format_file_size(metadata.len()));
                }
                match &status.error {
                    None => println!("Status:    valid"),
                    Some(e) => {
                        println!("Status:    invalid ({})", e);
                        println!("Hint:      {}", e.recovery_action());
                    }
                }
            }
            Ok(if status.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Check => {
            let curator = Curator::new(config);
            match curator.validate().await {
                Ok(description) => {
                    println!(
                        "vulnerability database is valid (schema {}, built {})",
                        description.schema_version,
                        description.built.to_rfc3339()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("vulnerability database is invalid: {}", e);
                    eprintln!("hint: {}", e.recovery_action());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Update { mirror, force } => {
            let mut config = config;
            if force {
                config.update_check_max_frequency = Duration::ZERO;
            }
            let renderers = ProgressRenderers::default();
            let curator = Curator::new(config)
                .with_client(Arc::new(LocalMirror::new(mirror)))
                .with_progress_callback(renderers.callback());

            let result = curator.update().await;
            renderers.finish().await;

            if result.context("unable to update vulnerability database")? {
                println!("vulnerability database updated");
            } else {
                println!("no vulnerability database update available");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Import { archive } => {
            let renderers = ProgressRenderers::default();
            let curator = Curator::new(config).with_progress_callback(renderers.callback());

            let result = curator.import(&archive).await;
            renderers.finish().await;

            result.with_context(|| format!("unable to import {}", archive.display()))?;
            println!("vulnerability database imported from {}", archive.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete => {
            Curator::new(config).delete().await?;
            println!("vulnerability database deleted");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Renders stage transitions of each published progress handle on stderr
#[derive(Default, Clone)]
struct ProgressRenderers {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ProgressRenderers {
    fn callback(&self) -> ProgressCallback {
        let tasks = Arc::clone(&self.tasks);
        Arc::new(move |progress| {
            tasks.lock().push(tokio::spawn(render_progress(progress)));
        })
    }

    /// Wait for every renderer to print its final line
    async fn finish(self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn render_progress(progress: StagedProgress) {
    let mut last_stage = String::new();
    loop {
        let completed = progress.is_completed();
        let stage = progress.stage();
        if !stage.is_empty() && stage != last_stage {
            eprintln!("[{:>3}%] {}", progress.percentage(), stage);
            last_stage = stage;
        }
        if completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

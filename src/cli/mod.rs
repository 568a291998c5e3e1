//! CLI Module
//!
//! Command-line interface for Stepwise using Clap v4.

use std::io::{BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::action::StepActions;
use crate::config::Config;
use crate::logging;
use crate::store::{self, ProgressSnapshot, ProgressStore};
use crate::tui;
use crate::utils::format_age;
use crate::wizard::WizardController;
use crate::wizard::onboarding::{self, PRIORITY_KEY, SOURCES_KEY, TEMPLATE_KEY};

/// Stepwise - Resumable onboarding wizard for the terminal
#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug mode (creates log files in .stepwise/logs/)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the onboarding wizard (default)
    Run {
        /// Session to save progress under (overrides config)
        #[arg(short, long)]
        session: Option<String>,

        /// Discard saved progress and start from the first step
        #[arg(long)]
        fresh: bool,
    },

    /// Show saved progress for a session
    Status {
        /// Session to inspect (overrides config)
        #[arg(short, long)]
        session: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Discard saved progress for a session
    Reset {
        /// Session to reset (overrides config)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration
    Config,

    /// Log management operations
    Logs {
        #[command(subcommand)]
        operation: LogCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// Show log file location and status
    Status,
    /// View recent log entries (requires debug mode)
    View {
        /// Number of lines to show (default: 50)
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
    /// Clean up old log files
    Clean {
        /// Maximum age in days (default: 7)
        #[arg(short = 'a', long, default_value = "7")]
        days: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Whether the command takes over the terminal
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, None | Some(Commands::Run { .. }))
    }
}

/// Main CLI entry point
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    if cli.debug {
        tracing::info!("Debug mode enabled");
    }

    match cli.command {
        None => cmd_run(&config, None, false).await,
        Some(Commands::Run { session, fresh }) => cmd_run(&config, session, fresh).await,
        Some(Commands::Status { session, format }) => cmd_status(&config, session, format).await,
        Some(Commands::Reset { session }) => cmd_reset(&config, session).await,
        Some(Commands::Init { force }) => cmd_init(force).await,
        Some(Commands::Config) => cmd_config(&config).await,
        Some(Commands::Logs { operation }) => cmd_logs(operation).await,
    }
}

/// Load configuration from file or defaults
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()?
    };

    config.validate()?;

    Ok(config)
}

fn session_or_default(config: &Config, session: Option<String>) -> String {
    session.unwrap_or_else(|| config.wizard.session_id.clone())
}

/// Interactive onboarding
async fn cmd_run(config: &Config, session: Option<String>, fresh: bool) -> Result<()> {
    let session_id = session_or_default(config, session);
    let store = store::open(&config.storage)
        .await
        .context("Failed to open progress store")?;

    if fresh {
        store
            .clear(&session_id)
            .await
            .with_context(|| format!("Failed to discard progress for session {}", session_id))?;
        tracing::info!("Discarded saved progress for session {}", session_id);
    }

    let actions = StepActions::from_config(onboarding::AUTH, &config.auth)?;
    let builder = WizardController::builder(onboarding::registry())
        .store(store)
        .action(Arc::new(actions))
        .session_id(session_id.as_str())
        .action_timeout(config.wizard.action_timeout());

    let app = tui::App::new(builder, config.wizard.keyboard_navigation);
    tui::run(app).await.context("TUI error")?;

    Ok(())
}

/// Print saved progress
async fn cmd_status(config: &Config, session: Option<String>, format: OutputFormat) -> Result<()> {
    let session_id = session_or_default(config, session);
    let store = store::open(&config.storage).await?;
    let snapshot = load_snapshot(store.as_ref(), &session_id).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        OutputFormat::Text => match snapshot {
            Some(snapshot) => print!("{}", describe_snapshot(&snapshot)),
            None => {
                println!("No saved progress for session '{}'.", session_id);
                println!("\nRun 'stepwise' to start onboarding.");
            }
        },
    }
    Ok(())
}

async fn load_snapshot(
    store: &dyn ProgressStore,
    session_id: &str,
) -> Result<Option<ProgressSnapshot>> {
    store
        .load(session_id)
        .await
        .with_context(|| format!("Failed to load progress from {} store", store.name()))
}

/// Human-readable summary of a saved session
fn describe_snapshot(snapshot: &ProgressSnapshot) -> String {
    let registry = onboarding::registry();
    let step_title = registry
        .get(snapshot.step_index)
        .map(|step| step.title().to_string())
        .unwrap_or_else(|| "(unknown step)".to_string());

    let sources = snapshot
        .data
        .get(SOURCES_KEY)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(onboarding::source_label)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "none".to_string());
    let field = |key: &str| {
        snapshot
            .data
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("-")
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&format!("Session:   {}\n", snapshot.session_id));
    out.push_str(&format!(
        "Step:      {} of {} ({})\n",
        snapshot.step_index + 1,
        registry.len(),
        step_title
    ));
    out.push_str(&format!("Reached:   step {}\n", snapshot.max_visited_index + 1));
    out.push_str(&format!("Sources:   {}\n", sources));
    out.push_str(&format!("Template:  {}\n", field(TEMPLATE_KEY)));
    out.push_str(&format!("Priority:  {}\n", field(PRIORITY_KEY)));
    out.push_str(&format!(
        "Saved:     {}\n",
        format_age(snapshot.timestamp, Utc::now())
    ));
    out
}

/// Discard saved progress
async fn cmd_reset(config: &Config, session: Option<String>) -> Result<()> {
    let session_id = session_or_default(config, session);
    let store = store::open(&config.storage).await?;
    store
        .clear(&session_id)
        .await
        .with_context(|| format!("Failed to discard progress for session {}", session_id))?;

    println!("Saved progress for session '{}' discarded.", session_id);
    Ok(())
}

/// Initialize configuration file
async fn cmd_init(force: bool) -> Result<()> {
    println!("Stepwise Configuration Initialization\n");

    let config_path =
        Config::system_config_path().context("Could not determine config directory")?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Config::default().save(&config_path)?;

    println!("Configuration initialized at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Pick a storage backend (memory, file, sqlite)");
    println!("   2. Set auth.endpoint to use a real sign-in service");
    println!("   3. Run 'stepwise' to start onboarding");

    Ok(())
}

/// Show configuration
async fn cmd_config(config: &Config) -> Result<()> {
    println!("Stepwise Configuration\n");
    println!("Session:            {}", config.wizard.session_id);
    println!("Action timeout:     {}s", config.wizard.action_timeout_secs);
    println!("Keyboard nav:       {}", config.wizard.keyboard_navigation);
    println!("Storage:            {}", config.storage.backend);
    println!(
        "Storage path:       {}",
        config.storage.resolved_path().display()
    );
    match &config.auth.endpoint {
        Some(endpoint) => println!("Auth:               {}", endpoint),
        None => println!(
            "Auth:               simulated ({}ms)",
            config.auth.simulated_latency_ms
        ),
    }
    println!("Log level:          {}", config.logging.level);
    if let Some(file) = &config.logging.file {
        println!("Log file:           {}", file.display());
    }
    Ok(())
}

/// Log management commands
async fn cmd_logs(operation: LogCommands) -> Result<()> {
    let log_dir = logging::default_log_dir();

    match operation {
        LogCommands::Status => {
            println!("Stepwise Logging Status\n");
            println!("Log directory: {}", log_dir.display());

            let logs = logging::list_logs(&log_dir);
            if logs.is_empty() {
                println!("Status: no logs found");
                println!("\nTo enable debug logging, run with -d flag:");
                println!("   stepwise -d");
                return Ok(());
            }

            let total_size: u64 = logs.iter().map(|(_, size, _)| size).sum();
            println!("Log files: {}", logs.len());
            println!(
                "Total size: {:.2} MB",
                total_size as f64 / (1024.0 * 1024.0)
            );
            if let Some(newest) = logging::get_log_path() {
                println!("Latest log: {}", newest.display());
            }
            Ok(())
        }

        LogCommands::View { lines } => {
            let Some(log_path) = logging::get_log_path() else {
                println!("No log files found.\n");
                println!("Run Stepwise with -d flag to enable debug logging:");
                println!("   stepwise -d");
                return Ok(());
            };

            println!(
                "Viewing last {} lines of: {}\n",
                lines,
                log_path.display()
            );
            let file = std::fs::File::open(&log_path)
                .with_context(|| format!("Failed to open {}", log_path.display()))?;
            let all_lines: Vec<String> = BufReader::new(file)
                .lines()
                .map_while(Result::ok)
                .collect();
            let start = all_lines.len().saturating_sub(lines);
            for line in &all_lines[start..] {
                println!("{}", line);
            }
            if all_lines.is_empty() {
                println!("(empty log file)");
            }
            Ok(())
        }

        LogCommands::Clean { days } => {
            println!("Cleaning up log files older than {} days...\n", days);
            let removed = logging::cleanup_old_logs(days)?;
            if removed > 0 {
                println!("Removed {} old log file(s)", removed);
            } else {
                println!("No old log files to remove");
            }
            Ok(())
        }
    }
}

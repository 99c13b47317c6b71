mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::context::AppContext;
use cli::{handlers, session_handlers, workflow_handlers};
use specloop_core::models::LogLevel;
use specloop_core::services::logging::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "specloop")]
#[command(version)]
#[command(about = "Spec-driven workflow runner with human approval gates")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    /// Path to configuration file (default: ~/.config/specloop/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory (default: current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the workflow bound to a mode
    ///
    /// Examples:
    ///   specloop start spec --spec checkout --input "One-page checkout"
    ///   specloop start quick --input "Rename the config loader"
    Start {
        /// Workflow mode (see `specloop modes`)
        mode: String,

        /// Spec (feature) name the documents are written under
        #[arg(short, long)]
        spec: Option<String>,

        /// Command that triggered the run
        #[arg(short, long)]
        command: Option<String>,

        /// Free-form request passed to the steps
        #[arg(short, long)]
        input: Option<String>,

        /// Approve every gate without prompting
        #[arg(short, long)]
        yes: bool,

        /// Output the outcome in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resume the workflow saved for this workspace
    Resume {
        /// Approve every gate without prompting
        #[arg(short, long)]
        yes: bool,

        /// Output the outcome in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Cancel the workflow saved for this workspace
    Cancel,

    /// Show the workflow saved for this workspace
    Status {
        /// Include the linked session's recent history
        #[arg(long)]
        logs: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List workflow modes
    Modes {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow definition file
    Validate {
        /// Path to the YAML workflow definition
        workflow_file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Summarize a tasks.md checklist
    Tasks {
        /// Path to the markdown checklist
        file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Session management commands
    Sessions {
        #[command(subcommand)]
        command: cli::session::SessionCommands,
    },

    /// Show or initialize the configuration file
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = AppContext::load(cli.config, cli.workspace)?;
    let level = cli.log_level.unwrap_or(ctx.config.log_level);
    if let Err(e) = init_logging(level) {
        eprintln!("⚠️  Failed to initialize logging: {}", e);
    }

    let exit_code = match cli.command {
        Commands::Start {
            mode,
            spec,
            command,
            input,
            yes,
            json,
        } => workflow_handlers::handle_start(&ctx, mode, spec, command, input, yes, json).await?,
        Commands::Resume { yes, json } => {
            workflow_handlers::handle_resume(&ctx, yes, json).await?
        }
        Commands::Cancel => {
            workflow_handlers::handle_cancel(&ctx)?;
            0
        }
        Commands::Status { logs, json } => {
            workflow_handlers::handle_status(&ctx, logs, json)?;
            0
        }
        Commands::Modes { json } => {
            workflow_handlers::handle_modes(&ctx, json)?;
            0
        }
        Commands::Validate {
            workflow_file,
            json,
        } => workflow_handlers::handle_validate(&ctx, workflow_file, json)?,
        Commands::Tasks { file, json } => {
            handlers::handle_tasks(file, json).await?;
            0
        }
        Commands::Sessions { command } => {
            session_handlers::handle_session_commands(&ctx, command)?;
            0
        }
        Commands::Config { init } => {
            handlers::handle_config(&ctx, init)?;
            0
        }
    };

    if exit_code != 0 {
        // Exit directly: a pending stdin prompt must not keep the runtime alive
        std::process::exit(exit_code);
    }
    Ok(())
}

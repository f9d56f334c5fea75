use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rfpflow::cli::CommandContext;
use rfpflow::cli::commands;
use rfpflow::workflow::{RunStatus, StepFlags};

#[derive(Parser)]
#[command(name = "rfpflow")]
#[command(
    version,
    about = "Workflow engine that turns RFP documents into sales insights and proposal drafts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Use this config file instead of the global/project chain")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, help = "Bind address (default from config)")]
        host: Option<String>,
        #[arg(long, short, help = "Port (default from config)")]
        port: Option<u16>,
    },

    /// Index the extracted text of an RFP document
    Ingest {
        #[arg(long, help = "Project id")]
        project: String,
        #[arg(long, help = "Document id")]
        document: String,
        #[arg(help = "Plain-text file with the extracted document")]
        file: PathBuf,
    },

    /// Load case studies from a JSON array
    ImportCases {
        #[arg(help = "JSON file")]
        file: PathBuf,
    },

    /// Run the analysis workflow and wait for it to finish
    Run {
        #[arg(long, help = "Project id")]
        project: String,
        #[arg(long, help = "Document id")]
        document: String,
        #[arg(long, help = "User to notify when the run finishes")]
        user: Option<String>,
        #[arg(long, help = "Extract challenges and value propositions")]
        challenges: bool,
        #[arg(long, help = "Generate discovery questions")]
        questions: bool,
        #[arg(long, help = "Match case studies")]
        cases: bool,
        #[arg(long, help = "Draft a proposal")]
        proposal: bool,
        #[arg(long, help = "Run every step")]
        all: bool,
    },

    /// Show the latest run of a project
    Status {
        #[arg(long, help = "Project id")]
        project: String,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(long, help = "List every attempt, newest first")]
        history: bool,
    },

    /// Show the accumulated insights of a project
    Insights {
        #[arg(long, help = "Project id")]
        project: String,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mrfpflow encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { host, port } => {
            let ctx = CommandContext::load(config_path)?;
            let rt = Runtime::new()?;
            rt.block_on(commands::serve::run(ctx, host, port))?;
        }
        Commands::Ingest {
            project,
            document,
            file,
        } => {
            let ctx = CommandContext::load(config_path)?;
            commands::ingest::run(&ctx, &project, &document, &file)?;
        }
        Commands::ImportCases { file } => {
            let ctx = CommandContext::load(config_path)?;
            commands::import::run(&ctx, &file)?;
        }
        Commands::Run {
            project,
            document,
            user,
            challenges,
            questions,
            cases,
            proposal,
            all,
        } => {
            let ctx = CommandContext::load(config_path)?;
            let rt = Runtime::new()?;
            let snapshot = rt.block_on(commands::run::run(
                &ctx,
                commands::run::RunOptions {
                    project,
                    document,
                    user,
                    flags: StepFlags {
                        challenges,
                        questions,
                        cases,
                        proposal,
                    },
                    all,
                },
            ))?;
            if snapshot.status != RunStatus::Completed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Status {
            project,
            format,
            history,
        } => {
            let ctx = CommandContext::load(config_path)?;
            commands::status::run(&ctx, &project, &format, history)?;
        }
        Commands::Insights { project, format } => {
            let ctx = CommandContext::load(config_path)?;
            commands::insights::run(&ctx, &project, &format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                let config = match config_path {
                    Some(path) => rfpflow::ConfigLoader::load_from_file(path)?,
                    None => rfpflow::ConfigLoader::load()?,
                };
                commands::config::show(&config, global, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

#![allow(
    dead_code,
    unused_imports,
    clippy::too_many_arguments,
    clippy::needless_borrows_for_generic_args,
    clippy::useless_format,
    clippy::len_zero,
    clippy::field_reassign_with_default
)]

use clap::{Parser, Subcommand};
use colored::Colorize;
use runsheet_core::{AppState, Database, RunsheetError, StorageBackend, UploadStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::{
    handle_exec_command, handle_runbooks_command, handle_upload_command, ExecCommand,
    RunbooksCommand,
};
use config::CliConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "runsheet")]
#[command(version = VERSION)]
#[command(about = "Runsheet - checklist runbooks and live incident executions")]
#[command(long_about = r#"
Runsheet keeps reusable runbooks (ordered checklists of steps with optional
links and images) and tracks executions of them against incidents: who ran
them, which steps are done and when, and remarks along the way.

Use 'runsheet serve' to start the API, then 'runsheet runbooks create' to
define a checklist and 'runsheet exec start' to work through it.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        env = "RUNSHEET_SERVER_URL",
        help = "Base URL of the Runsheet API"
    )]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the REST API server")]
    Serve {
        #[arg(long, help = "Interface to bind (default from config)")]
        host: Option<String>,

        #[arg(short, long, help = "Port to listen on (default 5000)")]
        port: Option<u16>,

        #[arg(long, help = "Keep data in memory instead of PostgreSQL")]
        memory: bool,

        #[arg(long, help = "Directory for uploaded files")]
        upload_dir: Option<PathBuf>,
    },

    #[command(about = "Initialize the database and the upload directory")]
    Init,

    #[command(about = "Check that the API server is reachable")]
    Health {
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Manage runbooks")]
    Runbooks {
        #[command(subcommand)]
        action: Option<RunbooksCommand>,
    },

    #[command(about = "Start and work through runbook executions")]
    Exec {
        #[command(subcommand)]
        action: Option<ExecCommand>,
    },

    #[command(about = "Upload an image and print its URL")]
    Upload {
        #[arg(help = "File to upload")]
        path: PathBuf,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Version { detailed } = cli.command {
        init_logging(cli.verbose, "warn", false);
        cmd_version(detailed);
        return ExitCode::SUCCESS;
    }

    let config = CliConfig::load(cli.server.clone());
    let default_level = match (&cli.command, &config) {
        (Commands::Serve { .. }, Ok(config)) => config.log_level().to_string(),
        _ => "warn".to_string(),
    };
    let json = config.as_ref().map(|c| c.json_logs()).unwrap_or(false);
    init_logging(cli.verbose, &default_level, json);

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            if let Some(suggestion) = e
                .downcast_ref::<RunsheetError>()
                .and_then(|e| e.user_suggestion())
            {
                eprintln!("  {} {}", "hint:".yellow(), suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, default_level: &str, json: bool) {
    let level = if verbose { "debug" } else { default_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn run(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            host,
            port,
            memory,
            upload_dir,
        } => cmd_serve(config, host, port, memory, upload_dir).await,
        Commands::Init => cmd_init(&config).await,
        Commands::Health { format } => cmd_health(&config, &format).await,
        Commands::Runbooks { action } => handle_runbooks_command(&config, action).await,
        Commands::Exec { action } => handle_exec_command(&config, action).await,
        Commands::Upload { path } => handle_upload_command(&config, &path).await,
        Commands::Version { detailed } => {
            cmd_version(detailed);
            Ok(())
        }
    }
}

async fn cmd_serve(
    config: CliConfig,
    host: Option<String>,
    port: Option<u16>,
    memory: bool,
    upload_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut core = config.core;
    if let Some(host) = host {
        core.server.host = host;
    }
    if let Some(port) = port {
        core.server.port = port;
    }
    if memory {
        core.server.storage = StorageBackend::Memory;
    }
    if let Some(dir) = upload_dir {
        core.server.upload_dir = dir;
    }
    core.validate()?;

    println!("{}", "Starting Runsheet API...".cyan().bold());
    println!();
    println!("  {} Storage:    {}", "→".blue(), core.server.storage);
    if core.server.storage == StorageBackend::Postgres {
        println!(
            "  {} Database:   {}",
            "→".blue(),
            mask_password(core.database_url())
        );
    }
    println!(
        "  {} Uploads:    {}",
        "→".blue(),
        core.server.upload_dir.display()
    );
    println!(
        "  {} Listening:  http://{}:{}",
        "→".blue(),
        core.server.host,
        core.server.port
    );
    println!();

    let state = AppState::from_config(&core).await?;
    runsheet_core::serve(&core, state).await?;

    println!("{}", "Server stopped".dimmed());
    Ok(())
}

async fn cmd_init(config: &CliConfig) -> anyhow::Result<()> {
    println!("{}", "Initializing Runsheet...".cyan().bold());
    println!();

    println!(
        "  {} Database URL: {}",
        "→".blue(),
        mask_password(config.database_url())
    );

    println!("  {} Connecting to database...", "→".blue());
    let db = Database::connect(&config.core.database).await?;

    println!("  {} Running migrations...", "→".blue());
    db.run_migrations().await?;

    println!("  {} Verifying connection...", "→".blue());
    db.health_check().await?;
    db.close().await;

    println!(
        "  {} Creating upload directory {}...",
        "→".blue(),
        config.upload_dir().display()
    );
    UploadStore::new(config.upload_dir()).ensure_dir().await?;

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        "Runsheet initialized successfully!".green()
    );

    Ok(())
}

async fn cmd_health(config: &CliConfig, format: &str) -> anyhow::Result<()> {
    let client = config.api_client()?;
    let health = client.health().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("{}", "Runsheet API Status".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<10} {}", "Server:".bold(), client.base_url());
    let status = if health.status == "ok" {
        health.status.green()
    } else {
        health.status.red()
    };
    println!("  {:<10} {}", "Status:".bold(), status);
    println!("  {:<10} {}", "Storage:".bold(), health.storage);
    if let Some(error) = &health.error {
        println!("  {:<10} {}", "Error:".bold(), error.red());
    }

    Ok(())
}

fn cmd_version(detailed: bool) {
    if detailed {
        println!("{}", "Runsheet Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Storage Backends:".bold());
        println!("    ◆ PostgreSQL");
        println!("    ◇ In-memory");
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("runsheet {}", VERSION);
    }
}

fn mask_password(url: &str) -> String {
    if let (Some(at_pos), Some(proto_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > proto_end + 3 {
            let before_auth = &url[..proto_end + 3];
            let after_at = &url[at_pos..];
            if let Some(colon_pos) = url[proto_end + 3..at_pos].find(':') {
                let user = &url[proto_end + 3..proto_end + 3 + colon_pos];
                return format!("{}{}:****{}", before_auth, user, after_at);
            }
        }
    }
    url.to_string()
}

mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cosign_agreement::LifecycleCoordinator;
use cosign_core::config::AppConfig;
use cosign_core::event::BroadcastHub;
use cosign_gateway::GatewayServer;
use cosign_llm::ChatGenerator;
use cosign_store::SqliteStore;

#[derive(Parser)]
#[command(name = "cosign", version, about = "Multi-party agreement generation and approval service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cosign.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway (default)
    Serve,
    /// Show resolved configuration
    Config,
    /// Run system health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cosign=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cosign", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Doctor) => {
            println!("Cosign Doctor");
            println!("=============");
            doctor::run_doctor(&config);
        }
        Some(Commands::Serve) | None => serve(config).await?,
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Explicit path, then `~/.cosign/config.toml`, then built-in defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".cosign").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    warn!(path = %path.display(), "No config file found, using defaults");
    let config = AppConfig::default();
    config.validate()?;
    Ok(config)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let workspace = config.workspace_dir();
    std::fs::create_dir_all(&workspace)?;

    // Temp files belong to in-process records; anything left over is orphaned.
    let temp_root = config.temp_root();
    if temp_root.exists() {
        if let Err(e) = std::fs::remove_dir_all(&temp_root) {
            warn!(path = %temp_root.display(), error = %e, "Could not clear stale temp files");
        }
    }

    let store = Arc::new(SqliteStore::open(&config.database_path())?);
    let notifier = cosign_mail::create_notifier(config.mail.as_ref());
    let generator = Arc::new(ChatGenerator::new(config.model.clone()));
    let hub = Arc::new(BroadcastHub::default());

    info!(
        model = %config.model.model_id,
        workers = config.generation.workers,
        approval_timeout_secs = config.approval.timeout_secs,
        mail = config.mail.is_some(),
        "Agreement service configured"
    );

    let coordinator = Arc::new(LifecycleCoordinator::new(
        &config,
        generator,
        notifier,
        store,
        hub,
    ));

    let server = GatewayServer::new(config.gateway.clone(), coordinator);
    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

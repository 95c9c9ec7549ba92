mod app;
mod config;
mod events;
mod executor;
mod generation;
mod logging;
mod server;
mod session;
mod templates;
mod terminal;
mod text_input;
mod theme;
mod ui;
mod validators;

use crate::config::{Config, ConfigLoadStatus, Strategy};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{debug, info, warn};

use crate::generation::anthropic::AnthropicClient;
use crate::generation::{Generator, LocalGenerator, RemoteGenerator};
use crate::server::Server;
use crate::session::SessionContext;
use crate::theme::Theme;

/// Terminal server that turns a task description into a phase-gated prompt.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,
    /// Prompt generation strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
    /// Config file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(strategy) = self.strategy {
            config.generation.strategy = strategy;
        }
    }
}

/// Contract a path by replacing the home directory with `~` for display.
fn contract_path(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(suffix) = path.strip_prefix(&home)
    {
        return format!("~/{}", suffix.display());
    }
    path.display().to_string()
}

fn build_generator(config: &Config) -> Result<Generator> {
    Ok(match config.generation.strategy {
        Strategy::Local => Generator::Local(LocalGenerator),
        Strategy::Remote => {
            let client = AnthropicClient::new(
                config.anthropic.api_key.clone(),
                config.anthropic.model.clone(),
                config.anthropic.max_tokens,
            )?;
            info!(model = client.model(), "anthropic_client_ready");
            Generator::Remote(RemoteGenerator::new(Arc::new(client)))
        }
    })
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "interrupt", "shutdown_requested"),
        _ = terminate => info!(signal = "terminate", "shutdown_requested"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded_config = config::load_config(cli.config.as_deref());
    let mut config = loaded_config.config;
    cli.apply(&mut config);

    // Logging needs the configured level, so it starts after config loading.
    let _guard = match logging::init(&config.logging.level) {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            Some(ctx._guard)
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    match &loaded_config.status {
        ConfigLoadStatus::Loaded | ConfigLoadStatus::Created => debug!(
            config_path = %contract_path(&loaded_config.config_path),
            status = ?loaded_config.status,
            "config_ready"
        ),
        ConfigLoadStatus::Error(message) => warn!(
            config_path = %contract_path(&loaded_config.config_path),
            error = %message,
            "config_defaults_used"
        ),
    }

    config.validate().map_err(|message| anyhow!(message))?;

    let generator = build_generator(&config)?;
    info!(
        strategy = generator.strategy_name(),
        export_dir = %contract_path(&config.export_dir()),
        "generator_ready"
    );

    let context = Arc::new(SessionContext {
        generator: Arc::new(generator),
        theme: Theme::default(),
        export_dir: config.export_dir(),
    });

    let server = Server::bind(&config.bind_address(), context).await?;
    server.run(shutdown_signal()).await
}

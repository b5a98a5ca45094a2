//! Supreme Chat - multi-persona AI assistant
//!
//! Entry point for the `supreme-chat` binary. Startup loads configuration
//! and the API key, binds the persona roster to one model client, then runs
//! either the WebSocket server or a terminal session.

mod agent;
mod cli;
mod config;
mod credentials;
mod error;
mod logging;
mod model;
mod persona;
mod session;
mod turn;
mod ui;
mod version;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::agent::{HandoffRuntime, RuntimeConfig};
use crate::cli::{Cli, Commands, ConfigSubcommand};
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::model::{ChatModel, OpenAiCompatModel, OpenAiConfig, SharedModel};
use crate::persona::PersonaRegistry;
use crate::turn::TurnHandler;
use crate::ui::{ChatServer, TerminalChat};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Personas => print_personas(),
        Commands::Config { subcommand } => handle_config_command(subcommand),
        Commands::Serve { config, bind } => {
            let mut config = ChatConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let addr = config.bind_addr()?;

            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
            log_startup("serve");

            let handler = build_turn_handler(&config)?;
            build_runtime()?.block_on(serve(config, addr, handler))
        }
        Commands::Chat { config } => {
            let config = ChatConfig::load(config.as_deref())?;

            // Keep the conversation readable unless asked for more
            let mut log_settings = config.logging.clone();
            if cli.verbose == 0 && log_settings.file.is_none() {
                log_settings.level = "warn".to_string();
            }
            let _log_guards = logging::init_logging(&log_settings, cli.verbose, cli.quiet)?;
            log_startup("chat");

            let handler = build_turn_handler(&config)?;
            build_runtime()?.block_on(chat(config, handler))
        }
    }
}

fn log_startup(mode: &str) {
    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        mode,
        "Starting Supreme Chat"
    );
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("supreme-chat")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

/// Credential, model client, roster and runtime. Fails before any session
/// exists if the API key is missing.
fn build_turn_handler(config: &ChatConfig) -> Result<TurnHandler> {
    let api_key = credentials::load_api_key(&config.model)?;

    let client = OpenAiCompatModel::new(OpenAiConfig::from_settings(&config.model), api_key)?;
    info!(
        backend = client.name(),
        model = client.model_id(),
        base_url = %config.model.base_url,
        "Model client ready"
    );
    let model: SharedModel = Arc::new(client);

    let dispatcher = PersonaRegistry::bundled()?.build(model)?;
    let runtime = Arc::new(HandoffRuntime::new(RuntimeConfig::from(&config.agent)));

    Ok(TurnHandler::new(
        dispatcher,
        runtime,
        config.agent.placeholder.clone(),
    ))
}

async fn serve(config: ChatConfig, addr: SocketAddr, handler: TurnHandler) -> Result<()> {
    let server = Arc::new(ChatServer::new(config.server.clone(), handler));
    let bound = server.start(addr).await?;
    info!(addr = %bound, "Supreme Chat ready; connect a WebSocket client to ws://{}", bound);

    tokio::signal::ctrl_c().await?;
    info!(active_sessions = server.active_sessions(), "Shutdown signal received");
    Ok(())
}

async fn chat(config: ChatConfig, handler: TurnHandler) -> Result<()> {
    let chat = TerminalChat::new(handler, config.server.welcome.clone());

    tokio::select! {
        result = chat.run_stdio() => {
            let session = result?;
            info!(turns = session.len(), "Chat finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }
    Ok(())
}

fn print_personas() -> Result<()> {
    let registry = PersonaRegistry::bundled()?;

    for listing in registry.list_available() {
        match &listing.tool {
            Some(tool) => println!("{} ({})  tool: {}", listing.name, listing.kind.slug(), tool),
            None => println!("{} ({})  dispatcher", listing.name, listing.kind.slug()),
        }
        if !listing.description.is_empty() {
            println!("    {}", listing.description);
        }
    }
    Ok(())
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = ChatConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            ChatConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

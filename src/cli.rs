//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for Supreme Chat.

use clap::{Parser, Subcommand};

/// Supreme Chat - multi-persona AI assistant
///
/// Routes every question through the Supreme AI dispatcher to one of five
/// specialist personas and streams the answer back over WebSocket or in the
/// terminal.
#[derive(Parser, Debug)]
#[command(name = "supreme-chat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve chat sessions over WebSocket
    Serve {
        /// Path to configuration file
        #[arg(short, long, env = "SUPREME_CHAT_CONFIG")]
        config: Option<String>,

        /// Listen address, overriding [server].bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Chat in this terminal
    Chat {
        /// Path to configuration file
        #[arg(short, long, env = "SUPREME_CHAT_CONFIG")]
        config: Option<String>,
    },

    /// List the persona roster
    Personas,

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Show current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long, env = "SUPREME_CHAT_CONFIG")]
        config: Option<String>,
    },

    /// Create default configuration file
    Init {
        /// Output path (default: ~/.supreme-chat/config.toml)
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, env = "SUPREME_CHAT_CONFIG")]
        config: Option<String>,
    },
}

//! CLI command definitions for the `palaver` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod caller;
pub mod chat;
pub mod history;
pub mod limits;
pub mod whoami;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::http::extractors::query::HistoryGrouping;
use caller::CallerArgs;

/// Chat with configured bots from the terminal or over HTTP.
#[derive(Parser)]
#[command(name = "palaver", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat with a bot.
    Chat {
        /// Bot id from config.toml.
        bot: String,

        /// Continue an existing conversation.
        #[arg(long)]
        chat_id: Option<String>,

        #[command(flatten)]
        caller: CallerArgs,
    },

    /// List past conversations.
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,

        /// Only conversations with this bot.
        #[arg(long)]
        bot: Option<String>,

        /// Conversations of an anonymous client id instead of the local one.
        #[arg(long, conflicts_with = "user")]
        client: Option<String>,

        #[command(flatten)]
        caller: CallerArgs,

        /// How to group the listing.
        #[arg(long, value_enum, default_value_t = HistoryGrouping::Full)]
        group: HistoryGrouping,
    },

    /// Show usage against each quota for a bot.
    Limits {
        /// Bot id from config.toml.
        bot: String,

        #[command(flatten)]
        caller: CallerArgs,
    },

    /// Show the session identity used by this machine.
    Whoami {
        /// Forget the stored session token.
        #[arg(long)]
        forget: bool,

        #[command(flatten)]
        caller: CallerArgs,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Delete conversations.
    Delete {
        /// A single conversation; all matching ones when omitted.
        chat_id: Option<String>,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

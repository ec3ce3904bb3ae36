//! CLI interface for Kotoba
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kotoba session engine
///
/// The session-persistence and intent-dispatch core of a Japanese-learning
/// assistant: a REST server plus a few direct inspection commands.
#[derive(Parser, Debug)]
#[command(name = "kotoba")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the REST API server
    Serve {
        /// Bind host override
        #[arg(long)]
        host: Option<String>,

        /// Bind port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one chat message through the dispatcher and print the reply
    Chat {
        /// User identifier
        #[arg(long)]
        user: String,

        /// Existing session to continue
        #[arg(long)]
        session: Option<i64>,

        /// The message to send
        message: String,
    },

    /// List a user's sessions, most recent first
    Sessions {
        /// User identifier
        user_id: String,
    },

    /// Show the full message history of a session
    History {
        /// Session identifier
        session_id: i64,
    },
}

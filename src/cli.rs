// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use rill_config::WireFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rill",
    about = "Stream model output to chat clients and rebuild code blocks on arrival",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay server
    Serve {
        /// Port to listen on (overrides config and $PORT)
        #[arg(long, short = 'p')]
        port: Option<u16>,
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Framing of relay → client messages
        #[arg(long, value_enum)]
        wire_format: Option<WireFormat>,
    },
    /// Chat with a running relay.
    ///
    /// Each PROMPT is sent in turn.  Without prompts, one prompt is read per
    /// line from stdin.
    Chat {
        /// WebSocket URL of the relay
        #[arg(long, short = 'u', env = "RILL_URL")]
        url: Option<String>,
        /// Framing the relay uses; must match the server
        #[arg(long, value_enum)]
        wire_format: Option<WireFormat>,
        #[arg(value_name = "PROMPT")]
        prompts: Vec<String>,
    },
    /// Print the effective configuration and exit
    ShowConfig,
    /// List all supported model providers
    ListProviders,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Log level used when neither `-v` nor `RUST_LOG` is given.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "info",
            _ => "warn",
        }
    }
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rill", &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from(["rill", "-v", "serve", "--port", "9000", "--wire-format", "sentinel"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve { port, wire_format, host } => {
                assert_eq!(port, Some(9000));
                assert_eq!(wire_format, Some(WireFormat::Sentinel));
                assert!(host.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn chat_collects_prompts() {
        let cli = Cli::parse_from(["rill", "chat", "--url", "ws://x/ws", "one", "two"]);
        match cli.command {
            Commands::Chat { url, prompts, .. } => {
                assert_eq!(url.as_deref(), Some("ws://x/ws"));
                assert_eq!(prompts, vec!["one".to_string(), "two".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_logs_at_info_by_default() {
        let cli = Cli::parse_from(["rill", "serve"]);
        assert_eq!(cli.command.default_log_level(), "info");
        let cli = Cli::parse_from(["rill", "show-config"]);
        assert_eq!(cli.command.default_log_level(), "warn");
    }
}

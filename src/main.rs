// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, BufRead};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use rill_client::{PlainPrinter, RelayClient};
use rill_config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.command.default_log_level());

    match cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
        Commands::ListProviders => list_providers_cmd(),
        Commands::ShowConfig => {
            let config = rill_config::load(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&redacted(config))?);
            Ok(())
        }
        Commands::Serve { port, host, wire_format } => {
            let mut config = rill_config::load(cli.config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(format) = wire_format {
                config.server.wire_format = format;
            }
            serve_cmd(config).await
        }
        Commands::Chat { url, wire_format, prompts } => {
            let mut config = rill_config::load(cli.config.as_deref())?;
            if let Some(url) = url {
                config.client.url = url;
            }
            if let Some(format) = wire_format {
                config.client.wire_format = format;
            }
            chat_cmd(&config, prompts).await
        }
    }
}

async fn serve_cmd(config: Config) -> anyhow::Result<()> {
    let provider = rill_model::from_config(&config.model)?;
    info!(provider = provider.name(), model = provider.model_name(), "model provider ready");
    rill_server::serve(config.server, provider)
        .await
        .context("relay server failed")
}

async fn chat_cmd(config: &Config, prompts: Vec<String>) -> anyhow::Result<()> {
    let client_cfg = &config.client;
    let mut client = RelayClient::connect(
        &client_cfg.url,
        client_cfg.wire_format,
        &client_cfg.default_language,
    )
    .await?;
    let mut printer = PlainPrinter::stdio();

    if prompts.is_empty() {
        debug!("reading prompts from stdin");
        for line in io::stdin().lock().lines() {
            let line = line.context("failed to read prompt from stdin")?;
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            client.ask(prompt, &mut printer).await?;
        }
    } else {
        client.run_queue(&prompts, &mut printer).await?;
    }

    client.close().await
}

fn list_providers_cmd() -> anyhow::Result<()> {
    let drivers = rill_model::list_drivers();
    println!("Supported Model Providers ({} total)\n", drivers.len());

    let id_w = drivers.iter().map(|d| d.id.len()).max().unwrap_or(10).max(10);
    let name_w = drivers.iter().map(|d| d.name.len()).max().unwrap_or(8).max(8);
    println!("{:<id_w$}  {:<name_w$}  DESCRIPTION", "ID", "NAME");
    println!("{}", "-".repeat(id_w + name_w + 40));
    for d in drivers {
        println!("{:<id_w$}  {:<name_w$}  {}", d.id, d.name, d.description);
        if let Some(env) = d.default_api_key_env {
            println!("{:<id_w$}  {:<name_w$}  API key env: {env}", "", "");
        }
    }
    Ok(())
}

/// Hide secrets before printing a configuration.
fn redacted(mut config: Config) -> Config {
    if config.model.api_key.is_some() {
        config.model.api_key = Some("<redacted>".into());
    }
    config
}

fn init_logging(verbosity: u8, default_level: &str) {
    let level = match verbosity {
        0 => default_level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use rill_config::WireFormat;

    use super::*;

    #[test]
    fn show_config_hides_api_key() {
        let mut config = Config::default();
        config.model.api_key = Some("secret".into());
        let text = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn default_wire_formats_match() {
        let config = Config::default();
        assert_eq!(config.server.wire_format, WireFormat::Envelope);
        assert_eq!(config.client.wire_format, config.server.wire_format);
    }
}

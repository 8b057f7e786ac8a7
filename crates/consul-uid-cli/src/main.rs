#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use config::{AppConfig, CliArgs, Command};
use consul_uid::Allocator;
use consul_uid_http::ConsulClient;
use telemetry::init_telemetry;

/// Exit code for a well-formed "no" answer: `peek` found nothing, or `ping`
/// got no answer.
const EXIT_NEGATIVE: u8 = 2;

fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    init_telemetry(config.log_format)?;
    log_startup_info(&config);

    let client = ConsulClient::new(config.consul.clone())
        .context("unable to build the Consul client")?;

    if config.command == Command::Ping {
        let reachable = client.is_reachable();
        tracing::info!(reachable, "pinged agent");
        return Ok(if reachable {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_NEGATIVE)
        });
    }

    let Some(allocator_config) = config.allocator else {
        anyhow::bail!("CONSUL_UID_NAME must be set");
    };
    let allocator = Allocator::new(client, allocator_config)?;

    match config.command {
        Command::Get => {
            let uid = allocator.get()?;
            println!("{uid}");
        }
        Command::Peek => match allocator.peek()? {
            Some(uid) => println!("{uid}"),
            None => {
                tracing::info!(namespace = %allocator.namespace(), "no id assigned yet");
                return Ok(ExitCode::from(EXIT_NEGATIVE));
            }
        },
        Command::Whoami => println!("{}", allocator.client_id()?),
        Command::Ping => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn log_startup_info(config: &AppConfig) {
    let agent = config
        .consul
        .base_url()
        .map_or_else(|_| config.consul.host.clone(), |url| url.to_string());

    tracing::debug!(command = ?config.command, %agent, "starting consul-uid");
    if let Some(allocator) = &config.allocator {
        tracing::debug!(
            name = %allocator.name,
            client_id = allocator.client_id.as_deref().unwrap_or("<agent>"),
            max_attempts = allocator.max_attempts,
            backoff = ?allocator.backoff,
            "allocator configured"
        );
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator CLI for the hive service kernel.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client::Client;
use hive_core::EventFilter;
use hive_wire::{Request, Response};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hive", version, about = "Multi-tenant service kernel CLI")]
struct Cli {
    /// Tenant id for tenant-scoped commands
    #[arg(long, global = true, env = "HIVE_TENANT")]
    tenant: Option<String>,

    /// Daemon socket path override
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a service from a module manifest file
    Deploy {
        service: String,
        /// Path to the module source (manifest)
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "native")]
        format: String,
    },

    /// Show a live status sample for a service
    Status { service: String },

    /// Stop a service (graceful, then hard with --force)
    Kill {
        service: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        force: bool,
    },

    /// List the tenant's services
    List,

    /// Hot-swap a running service's code in place
    Swap {
        service: String,
        #[arg(long)]
        file: PathBuf,
        /// Rollback window in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,
    },

    /// Safe swap: kill then deploy
    Replace {
        service: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Stream events to stdout
    Watch {
        /// Only events for this service
        #[arg(long)]
        service: Option<String>,
        /// Replay stored events newer than this id first
        #[arg(long)]
        since: Option<u64>,
    },

    /// Secret management
    Secret {
        #[command(subcommand)]
        command: SecretCommand,
    },

    /// Issue a capability token
    Grant {
        resource: String,
        #[arg(long, value_delimiter = ',')]
        permissions: Vec<String>,
        #[arg(long, default_value_t = 3600)]
        ttl_seconds: u64,
    },

    /// Revoke a capability by token hash
    Revoke { token_hash: String },

    /// Load shedder statistics
    ShedStats,

    /// Daemon health
    Health,

    /// Kernel counters
    Metrics,

    /// Stop the daemon
    Shutdown {
        #[arg(long)]
        grace_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SecretCommand {
    /// Store a secret
    Set {
        name: String,
        value: String,
        #[arg(long, env = "HIVE_MASTER_KEY")]
        master_key: String,
    },
    /// Retrieve a secret
    Get {
        name: String,
        #[arg(long, env = "HIVE_MASTER_KEY")]
        master_key: String,
    },
    /// Delete a secret
    Rm { name: String },
    /// List secret names
    Ls,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::connect(cli.socket.clone(), cli.tenant.clone()).await?;
    run(cli.command, client).await
}

async fn run(command: Command, mut client: Client) -> Result<()> {
    match command {
        Command::Deploy { service, file, format } => {
            let code = std::fs::read_to_string(&file)?;
            let response = client.request(Request::Deploy { service, code, format }).await?;
            match expect_ok(response)? {
                Response::Deployed { entry } => {
                    println!("deployed {} (worker {})", entry.service, entry.worker_id);
                }
                other => print_json(&other)?,
            }
        }

        Command::Status { service } => {
            let response = client.request(Request::Status { service }).await?;
            match expect_ok(response)? {
                Response::StatusInfo { entry } => print_json(&entry)?,
                other => print_json(&other)?,
            }
        }

        Command::Kill { service, timeout_ms, force } => {
            let response = client.request(Request::Kill { service, timeout_ms, force }).await?;
            expect_ok(response)?;
            println!("killed");
        }

        Command::List => {
            let response = client.request(Request::List).await?;
            match expect_ok(response)? {
                Response::Services { services } => {
                    for service in services {
                        let alive = if service.alive { "up" } else { "down" };
                        println!("{:<24} {:<6} {}", service.service, alive, service.worker_id);
                    }
                }
                other => print_json(&other)?,
            }
        }

        Command::Swap { service, file, window_ms } => {
            let code = std::fs::read_to_string(&file)?;
            let response = client
                .request(Request::Swap { service, code, rollback_window_ms: window_ms })
                .await?;
            expect_ok(response)?;
            println!("swap started");
        }

        Command::Replace { service, file } => {
            let code = std::fs::read_to_string(&file)?;
            let response = client.request(Request::Replace { service, code }).await?;
            expect_ok(response)?;
            println!("replaced");
        }

        Command::Watch { service, since } => {
            let mut filter = EventFilter::all();
            if let Some(service) = service {
                filter.service = Some(
                    hive_core::ServiceName::new(&service)
                        .map_err(|e| anyhow::anyhow!(e.to_string()))?,
                );
            }
            filter.since_id = since;
            client.stream_events(Request::WatchEvents { filter }).await?;
        }

        Command::Secret { command } => match command {
            SecretCommand::Set { name, value, master_key } => {
                let response =
                    client.request(Request::SetSecret { name, value, master_key }).await?;
                expect_ok(response)?;
                println!("stored");
            }
            SecretCommand::Get { name, master_key } => {
                let response = client.request(Request::GetSecret { name, master_key }).await?;
                match expect_ok(response)? {
                    Response::Secret { value } => println!("{value}"),
                    other => print_json(&other)?,
                }
            }
            SecretCommand::Rm { name } => {
                let response = client.request(Request::DeleteSecret { name }).await?;
                expect_ok(response)?;
                println!("deleted");
            }
            SecretCommand::Ls => {
                let response = client.request(Request::ListSecrets).await?;
                match expect_ok(response)? {
                    Response::SecretNames { names } => {
                        for name in names {
                            println!("{name}");
                        }
                    }
                    other => print_json(&other)?,
                }
            }
        },

        Command::Grant { resource, permissions, ttl_seconds } => {
            let response = client
                .request(Request::GrantCapability { resource, permissions, ttl_seconds })
                .await?;
            match expect_ok(response)? {
                Response::Granted { capability_id, token, expires_at_ms } => {
                    println!("capability: {capability_id}");
                    println!("token:      {token}");
                    println!("expires_at: {expires_at_ms}");
                    eprintln!("(the token is shown exactly once; store it now)");
                }
                other => print_json(&other)?,
            }
        }

        Command::Revoke { token_hash } => {
            let response = client.request(Request::RevokeCapability { token_hash }).await?;
            expect_ok(response)?;
            println!("revoked");
        }

        Command::ShedStats => {
            let response = client.request(Request::ShedStats).await?;
            match expect_ok(response)? {
                Response::ShedStats { stats } => print_json(&stats)?,
                other => print_json(&other)?,
            }
        }

        Command::Health => {
            let response = client.request(Request::Health).await?;
            match expect_ok(response)? {
                Response::HealthInfo { health } => print_json(&health)?,
                other => print_json(&other)?,
            }
        }

        Command::Metrics => {
            let response = client.request(Request::Metrics).await?;
            match expect_ok(response)? {
                Response::MetricsText { text } => print!("{text}"),
                other => print_json(&other)?,
            }
        }

        Command::Shutdown { grace_ms } => {
            let response = client.request(Request::Shutdown { grace_ms }).await?;
            match response {
                Response::ShuttingDown => println!("daemon shutting down"),
                Response::Error { error } => bail!("{error}"),
                other => bail!("unexpected reply: {other:?}"),
            }
        }
    }

    Ok(())
}

/// Turn error responses into CLI failures, pass everything else through.
fn expect_ok(response: Response) -> Result<Response> {
    match response {
        Response::Error { error } => bail!("{error}"),
        other => Ok(other),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn expect_ok_passes_success_through() {
        assert!(expect_ok(Response::Ok).is_ok());
        assert!(expect_ok(Response::Pong).is_ok());
    }

    #[test]
    fn expect_ok_fails_on_error_responses() {
        let error = hive_core::ErrorBody::new(hive_core::ErrorKind::NotFound, "missing", 1);
        let result = expect_ok(Response::Error { error });
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing"));
    }

    #[test]
    fn watch_parses_filters() {
        let cli = Cli::parse_from(["hive", "--tenant", "acme", "watch", "--service", "svc"]);
        assert!(matches!(
            cli.command,
            Command::Watch { service: Some(ref s), since: None } if s == "svc"
        ));
    }
}

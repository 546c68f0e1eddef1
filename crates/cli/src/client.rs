// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client for talking to hived.

use anyhow::{bail, Context, Result};
use hive_wire::{read_response, write_request, Request, Response};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn io_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Default daemon socket: HIVE_STATE_DIR > XDG_STATE_HOME/hive > ~/.local/state/hive
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("HIVE_STATE_DIR") {
        return Ok(PathBuf::from(dir).join("hived.sock"));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("hive/hived.sock"));
    }
    let home = std::env::var("HOME").context("neither HIVE_STATE_DIR nor HOME is set")?;
    Ok(PathBuf::from(home).join(".local/state/hive/hived.sock"))
}

pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect and run the Hello handshake for `tenant`.
    pub async fn connect(socket: Option<PathBuf>, tenant: Option<String>) -> Result<Self> {
        let path = match socket {
            Some(path) => path,
            None => default_socket_path()?,
        };
        let stream = UnixStream::connect(&path)
            .await
            .with_context(|| format!("cannot reach hived at {} (is it running?)", path.display()))?;
        let (reader, writer) = stream.into_split();
        let mut client = Self { reader, writer };

        let hello = Request::Hello {
            version: CLIENT_VERSION.to_string(),
            tenant,
            token: std::env::var("HIVE_AUTH_TOKEN").ok(),
        };
        match client.request(hello).await? {
            Response::HelloAck { .. } => Ok(client),
            Response::Error { error } => bail!("handshake rejected: {error}"),
            other => bail!("unexpected handshake reply: {other:?}"),
        }
    }

    /// One request, one reply.
    pub async fn request(&mut self, request: Request) -> Result<Response> {
        write_request(&mut self.writer, &request, io_timeout()).await?;
        Ok(read_response(&mut self.reader, io_timeout()).await?)
    }

    /// Send `request`, then print event frames until the daemon goes away.
    pub async fn stream_events(mut self, request: Request) -> Result<()> {
        write_request(&mut self.writer, &request, io_timeout()).await?;
        loop {
            let frame = match read_response(&mut self.reader, Duration::from_secs(3600)).await {
                Ok(frame) => frame,
                Err(hive_wire::ProtocolError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            match frame {
                Response::Event { event } => {
                    println!(
                        "{:>8}  {:<24} {:<24} {}",
                        event.id,
                        event.event_type.to_string(),
                        event
                            .tenant()
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| ":system".to_string()),
                        serde_json::to_string(&event.payload).unwrap_or_default(),
                    );
                }
                Response::Error { error } => bail!("{error}"),
                other => bail!("unexpected frame: {other:?}"),
            }
        }
    }
}

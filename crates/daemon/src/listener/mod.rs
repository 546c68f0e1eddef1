// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts connections on the Unix socket (and optionally TCP) and handles
//! each in a spawned task. A connection establishes its tenant scope once
//! in the `Hello` handshake — the socket analog of an `X-Tenant-Id` header
//! or a client-certificate CN — and every tenant-scoped request after that
//! runs against that tenant.

mod dispatch;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hive_core::{ErrorBody, ErrorKind, SystemClock, TenantId};
use hive_engine::Kernel;
use hive_wire::{self as wire, ProtocolError, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::env::{idle_timeout, ipc_timeout, PROTOCOL_VERSION};

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub kernel: Arc<Kernel<SystemClock>>,
    pub shutdown: Arc<Notify>,
    /// Grace period requested by the Shutdown command (ms)
    pub shutdown_grace_ms: AtomicU64,
    /// Auth token for TCP connections (from `HIVE_AUTH_TOKEN`).
    /// When set, TCP clients must provide this token in the Hello handshake.
    pub auth_token: Option<String>,
}

/// Where a connection came from; TCP requires the auth token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionSource {
    Unix,
    Tcp,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    unix: UnixListener,
    tcp: Option<TcpListener>,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    /// Create a new listener with Unix socket only.
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, tcp: None, ctx }
    }

    /// Create a new listener with both Unix socket and TCP.
    pub fn with_tcp(unix: UnixListener, tcp: TcpListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, tcp: Some(tcp), ctx }
    }

    /// Run the accept loop, spawning a task per connection.
    pub async fn run(mut self) {
        match self.tcp.take() {
            Some(tcp) => self.run_dual(tcp).await,
            None => self.run_unix_only().await,
        }
    }

    async fn run_unix_only(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) =
                            handle_connection(reader, writer, ConnectionSource::Unix, &ctx).await
                        {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("Unix accept error: {}", e),
            }
        }
    }

    async fn run_dual(self, tcp: TcpListener) {
        info!("listening on TCP {:?}", tcp.local_addr().ok());
        loop {
            tokio::select! {
                unix_conn = self.unix.accept() => match unix_conn {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) =
                                handle_connection(reader, writer, ConnectionSource::Unix, &ctx).await
                            {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("Unix accept error: {}", e),
                },
                tcp_conn = tcp.accept() => match tcp_conn {
                    Ok((stream, peer)) => {
                        debug!(%peer, "TCP connection");
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) =
                                handle_connection(reader, writer, ConnectionSource::Tcp, &ctx).await
                            {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("TCP accept error: {}", e),
                },
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {}
        other => warn!("connection error: {}", other),
    }
}

/// Current wall-clock milliseconds for error bodies.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) fn error_response(kind: ErrorKind, message: impl Into<String>) -> Response {
    Response::error(ErrorBody::new(kind, message, now_ms()))
}

/// Per-connection state established by the Hello handshake.
struct ConnState {
    tenant: Option<TenantId>,
    authenticated: bool,
}

/// Drive one connection until it closes.
pub(crate) async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    source: ConnectionSource,
    ctx: &Arc<ListenCtx>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut conn = ConnState {
        tenant: None,
        // Unix socket connections are trusted local operators.
        authenticated: source == ConnectionSource::Unix || ctx.auth_token.is_none(),
    };

    loop {
        let request = match wire::read_request(&mut reader, idle_timeout()).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::Timeout) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match request {
            Request::Hello { version, tenant, token } => {
                if version != PROTOCOL_VERSION {
                    debug!(client = %version, daemon = PROTOCOL_VERSION, "version skew");
                }
                if source == ConnectionSource::Tcp {
                    match (&ctx.auth_token, token) {
                        (Some(expected), Some(got)) if *expected == got => {
                            conn.authenticated = true;
                        }
                        (None, _) => conn.authenticated = true,
                        _ => {
                            let response =
                                error_response(ErrorKind::Unauthorized, "bad auth token");
                            wire::write_response(&mut writer, &response, ipc_timeout()).await?;
                            return Ok(());
                        }
                    }
                }
                match tenant {
                    Some(raw) => match TenantId::new(&raw) {
                        Ok(tenant) => {
                            conn.tenant = Some(tenant);
                        }
                        Err(e) => {
                            let response =
                                error_response(ErrorKind::Unauthorized, e.to_string());
                            wire::write_response(&mut writer, &response, ipc_timeout()).await?;
                            continue;
                        }
                    },
                    None => conn.tenant = None,
                }
                let response = Response::HelloAck { version: PROTOCOL_VERSION.to_string() };
                wire::write_response(&mut writer, &response, ipc_timeout()).await?;
            }

            Request::WatchEvents { mut filter } => {
                if !conn.authenticated {
                    let response = error_response(ErrorKind::Unauthorized, "handshake required");
                    wire::write_response(&mut writer, &response, ipc_timeout()).await?;
                    return Ok(());
                }
                // Tenant connections only ever see their own events.
                if let Some(tenant) = &conn.tenant {
                    filter.tenant = Some(tenant.clone());
                }
                dispatch::watch_events(ctx, filter, &mut writer).await?;
                return Ok(());
            }

            Request::Shutdown { grace_ms } => {
                if !conn.authenticated {
                    let response = error_response(ErrorKind::Unauthorized, "handshake required");
                    wire::write_response(&mut writer, &response, ipc_timeout()).await?;
                    return Ok(());
                }
                if let Some(grace) = grace_ms {
                    ctx.shutdown_grace_ms.store(grace, Ordering::Relaxed);
                }
                wire::write_response(&mut writer, &Response::ShuttingDown, ipc_timeout()).await?;
                ctx.shutdown.notify_one();
                return Ok(());
            }

            request => {
                let response = if conn.authenticated {
                    dispatch::dispatch(ctx, conn.tenant.as_ref(), request).await
                } else {
                    error_response(ErrorKind::Unauthorized, "handshake required")
                };
                wire::write_response(&mut writer, &response, ipc_timeout()).await?;
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

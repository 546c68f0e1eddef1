// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request → kernel operation mapping.

use super::{error_response, ListenCtx};
use crate::env::ipc_timeout;
use hive_core::{ErrorKind, EventFilter, TenantId};
use hive_engine::{EngineError, KillOptions, SwapOptions};
use hive_wire::{self as wire, ProtocolError, Request, Response};
use std::sync::Arc;
use tokio::io::AsyncWrite;

fn engine_error(e: EngineError) -> Response {
    error_response(e.kind(), e.to_string())
}

fn require_tenant<'a>(tenant: Option<&'a TenantId>) -> Result<&'a TenantId, Response> {
    tenant.ok_or_else(|| {
        error_response(ErrorKind::Unauthorized, "no tenant on this connection (send Hello)")
    })
}

/// Handle every non-streaming request.
pub(crate) async fn dispatch(
    ctx: &Arc<ListenCtx>,
    tenant: Option<&TenantId>,
    request: Request,
) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Deploy { service, code, format } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.deploy(t, &service, &code, &format).await {
                Ok(entry) => Response::Deployed { entry },
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::Status { service } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.status(t, &service) {
                Ok(entry) => Response::StatusInfo { entry },
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::Kill { service, timeout_ms, force } => match require_tenant(tenant) {
            Ok(t) => {
                let mut opts = KillOptions::default();
                if let Some(ms) = timeout_ms {
                    opts.timeout_ms = ms;
                }
                opts.force = force;
                match ctx.kernel.kill(t, &service, opts).await {
                    Ok(()) => Response::Ok,
                    Err(e) => engine_error(e),
                }
            }
            Err(response) => response,
        },

        Request::List => match require_tenant(tenant) {
            Ok(t) => Response::Services { services: ctx.kernel.list(t) },
            Err(response) => response,
        },

        Request::Swap { service, code, rollback_window_ms } => match require_tenant(tenant) {
            Ok(t) => {
                let mut opts = SwapOptions::default();
                if let Some(ms) = rollback_window_ms {
                    opts.rollback_window_ms = ms;
                }
                match ctx.kernel.swap(t, &service, &code, opts).await {
                    Ok(()) => Response::Ok,
                    Err(e) => engine_error(e),
                }
            }
            Err(response) => response,
        },

        Request::Replace { service, code } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.replace(t, &service, &code).await {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::RegisterService { service, name, tags } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.register_service(t, &service, name, tags) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::DiscoverService { name, tags } => match require_tenant(tenant) {
            Ok(t) => Response::Services { services: ctx.kernel.discover_service(t, &name, &tags) },
            Err(response) => response,
        },

        Request::GetServices { name } => match require_tenant(tenant) {
            Ok(t) => Response::Services { services: ctx.kernel.get_services(t, name.as_deref()) },
            Err(response) => response,
        },

        Request::GrantCapability { resource, permissions, ttl_seconds } => {
            match require_tenant(tenant) {
                Ok(t) => {
                    let grant = ctx.kernel.grant_capability(t, &resource, permissions, ttl_seconds);
                    Response::Granted {
                        capability_id: grant.id.to_string(),
                        token: grant.token,
                        expires_at_ms: grant.expires_at_ms,
                    }
                }
                Err(response) => response,
            }
        }

        Request::VerifyCapability { token, resource, permission } => {
            match ctx.kernel.verify_capability(&token, &resource, &permission) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            }
        }

        Request::RevokeCapability { token_hash } => {
            ctx.kernel.revoke_capability(&token_hash);
            Response::Ok
        }

        Request::SetSecret { name, value, master_key } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.set_secret(t, &name, value.as_bytes(), master_key.as_bytes())
            {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::GetSecret { name, master_key } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.get_secret(t, &name, master_key.as_bytes()) {
                Ok(value) => Response::Secret {
                    value: String::from_utf8_lossy(value.as_slice()).into_owned(),
                },
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::DeleteSecret { name } => match require_tenant(tenant) {
            Ok(t) => match ctx.kernel.delete_secret(t, &name) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            },
            Err(response) => response,
        },

        Request::ListSecrets => match require_tenant(tenant) {
            Ok(t) => Response::SecretNames { names: ctx.kernel.list_secrets(t) },
            Err(response) => response,
        },

        Request::ShedStats => Response::ShedStats { stats: ctx.kernel.shed_stats() },

        Request::Health => Response::HealthInfo { health: ctx.kernel.health() },

        Request::Metrics => Response::MetricsText { text: ctx.kernel.metrics_text() },

        // Handled by the connection loop; unreachable here.
        Request::Hello { .. } | Request::WatchEvents { .. } | Request::Shutdown { .. } => {
            error_response(ErrorKind::InvalidInput, "unexpected request")
        }
    }
}

/// Stream stored + live events to the writer until it goes away.
pub(crate) async fn watch_events<W>(
    ctx: &Arc<ListenCtx>,
    filter: EventFilter,
    writer: &mut W,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    // Catch up from the log when the client asked for history.
    if filter.since_id.is_some() {
        for event in ctx.kernel.stream(&filter) {
            let frame = Response::Event { event };
            wire::write_response(writer, &frame, ipc_timeout()).await?;
        }
    }

    let (id, mut rx) = ctx.kernel.watch();
    let result = loop {
        match rx.recv().await {
            Some(event) => {
                if !filter.matches(&event) {
                    continue;
                }
                let frame = Response::Event { event: (*event).clone() };
                // A closed client unsubscribes us.
                if let Err(e) = wire::write_response(writer, &frame, ipc_timeout()).await {
                    break Err(e);
                }
            }
            // Dropped by the store (lagging) or shutdown.
            None => break Ok(()),
        }
    };
    ctx.kernel.unwatch(id);

    match result {
        Err(ProtocolError::ConnectionClosed) | Ok(()) => Ok(()),
        Err(ProtocolError::Io(_)) | Err(ProtocolError::Timeout) => Ok(()),
        Err(e) => Err(e),
    }
}

//! WebSocket subscriptions: a client joins its tenant rooms and receives the
//! typed event records as JSON text frames. Delivery is fire-and-forget; a
//! client that falls behind is disconnected and reconciles via a fetch.

use crate::{error::ApiError, principal::Caller, routes::AppState};
use app_core::{CoreError, CrEventStream, CrTopic, EffectiveTenant};
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{StreamExt, stream};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// comma separated room kinds: `tournaments`, `flyer`
    #[serde(default)]
    pub rooms: Option<String>,
    /// id or slug of a tournament room to join
    #[serde(default)]
    pub tournament: Option<String>,
}

#[instrument(name = "ws_connection", skip(ws, state, caller, query))]
pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SubscribeQuery>,
) -> Result<Response, ApiError> {
    let tenant = EffectiveTenant::resolve(caller.0.as_ref())?;
    // rooms are tenant-concrete; the view-all sentinel has none to join
    let user_id = tenant.write_id()?;

    let mut topics = Vec::new();
    let kinds = query.rooms.as_deref().unwrap_or("tournaments");
    for kind in kinds.split(',').map(str::trim) {
        match kind {
            "tournaments" => topics.push(CrTopic::TenantTournaments(user_id)),
            "flyer" => topics.push(CrTopic::Flyer(user_id)),
            "" => {}
            other => {
                return Err(ApiError::from(CoreError::Validation(format!(
                    "unknown room kind: {other}"
                ))));
            }
        }
    }
    if let Some(reference) = &query.tournament {
        let tournament = state.core.find_tournament(&tenant, reference).await?;
        topics.push(CrTopic::Tournament {
            user_id,
            tournament_id: tournament.id,
        });
    }

    let mut streams: Vec<CrEventStream> = Vec::with_capacity(topics.len());
    for topic in topics {
        let stream = state
            .core
            .client_registry
            .subscribe(topic)
            .await
            .map_err(CoreError::from)?;
        streams.push(stream);
    }

    info!(rooms = streams.len(), "ws_connected");
    Ok(ws.on_upgrade(move |socket| run_socket(socket, streams)))
}

async fn run_socket(mut socket: WebSocket, streams: Vec<CrEventStream>) {
    let mut merged = stream::select_all(streams);
    loop {
        tokio::select! {
            event = merged.next() => {
                match event {
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(text) => {
                            if socket.send(Message::Text(text.into())).await.is_err() {
                                debug!("ws_client_gone");
                                break;
                            }
                        }
                        Err(e) => {
                            // recoverable per-event failure: warn (don't spam)
                            warn!(error = %e, "serialize_event_failed");
                        }
                    },
                    None => {
                        // every room ended (subscriber lagged out); tell the
                        // client to resync via a fresh connection
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    // inbound frames are ignored; the socket is one-way
                    _ => {}
                }
            }
        }
    }
}

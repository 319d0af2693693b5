//! Push subscription with silent polling fallback.
//!
//! One background task per session. It first tries the websocket push
//! channel; if the connection cannot be established or drops, it
//! degrades to polling the fetch-state endpoint at a fixed interval.
//! Downstream, both transports are indistinguishable: every payload
//! arrives on the same inbound queue, untrusted.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::protocol::StatePayload;
use crate::session::events::Inbound;
use crate::sync::client::SyncClient;

pub(crate) struct PushConfig {
    pub backend_url: String,
    pub match_id: String,
    pub token: Option<String>,
    pub poll_interval: Duration,
}

/// Websocket URL for a match subscription.
fn ws_url(backend_url: &str, match_id: &str) -> String {
    let base = backend_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/matches/ws/{match_id}")
}

pub(crate) fn spawn_push_listener(
    client: Arc<dyn SyncClient>,
    config: PushConfig,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = run(client, config, tx) => {}
        }
    })
}

async fn run(client: Arc<dyn SyncClient>, config: PushConfig, tx: mpsc::Sender<Inbound>) {
    if subscribe_ws(&config, &tx).await {
        info!(match_id = %config.match_id, "push channel closed, falling back to polling");
    } else {
        info!(match_id = %config.match_id, "push channel unavailable, polling instead");
    }
    poll_loop(client, &config, &tx).await;
}

/// Drive the websocket until it drops. Returns true if a connection
/// was ever established.
async fn subscribe_ws(config: &PushConfig, tx: &mpsc::Sender<Inbound>) -> bool {
    let url = ws_url(&config.backend_url, &config.match_id);
    let mut request = match url.clone().into_client_request() {
        Ok(req) => req,
        Err(err) => {
            warn!(url, error = %err, "invalid websocket request");
            return false;
        }
    };
    if let Some(token) = &config.token {
        match format!("Bearer {token}").parse() {
            Ok(value) => {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("bearer token is not a valid header value"),
        }
    }

    let (mut stream, _) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(err) => {
            debug!(url, error = %err, "websocket connect failed");
            return false;
        }
    };
    info!(match_id = %config.match_id, "push channel connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<StatePayload>(&text) {
                Ok(payload) => {
                    if tx
                        .send(Inbound::ServerState {
                            payload,
                            trusted: false,
                        })
                        .await
                        .is_err()
                    {
                        return true;
                    }
                }
                Err(err) => {
                    // Malformed frames are dropped, never fatal.
                    debug!(error = %err, "unparseable push frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "push channel error");
                break;
            }
        }
    }
    true
}

async fn poll_loop(client: Arc<dyn SyncClient>, config: &PushConfig, tx: &mpsc::Sender<Inbound>) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match client.fetch_state(&config.match_id).await {
            Ok(payload) => {
                if tx
                    .send(Inbound::ServerState {
                        payload,
                        trusted: false,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(err @ SyncError::Terminal(_)) => {
                let _ = tx.send(Inbound::SyncFailed(err)).await;
                return;
            }
            Err(err) => {
                // Transient poll failures are invisible; the heartbeat
                // owns connectivity reporting.
                debug!(error = %err, "poll failed");
            }
        }
    }
}

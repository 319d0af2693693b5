//! Periodic backend liveness probe.
//!
//! Reports only connectivity *transitions*: the strike threshold
//! being crossed (the controller then forces a resync and shows a
//! reconnecting indicator) and the first success afterwards.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::events::Inbound;
use crate::sync::client::SyncClient;

pub(crate) fn spawn_heartbeat(
    client: Arc<dyn SyncClient>,
    match_id: String,
    interval: Duration,
    strikes: u32,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = run(client, match_id, interval, strikes, tx) => {}
        }
    })
}

async fn run(
    client: Arc<dyn SyncClient>,
    match_id: String,
    interval: Duration,
    strikes: u32,
    tx: mpsc::Sender<Inbound>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut failures: u32 = 0;
    let mut reported_down = false;

    loop {
        ticker.tick().await;
        if client.heartbeat(&match_id).await {
            failures = 0;
            if reported_down {
                reported_down = false;
                if tx.send(Inbound::ConnectivityRestored).await.is_err() {
                    return;
                }
            }
            continue;
        }

        failures = failures.saturating_add(1);
        debug!(match_id = %match_id, failures, "heartbeat missed");
        if failures >= strikes && !reported_down {
            reported_down = true;
            warn!(match_id = %match_id, failures, "heartbeat threshold crossed");
            if tx.send(Inbound::ConnectivityLost).await.is_err() {
                return;
            }
        }
    }
}

//! Single-slot cooperative timer for the session task.
//!
//! One session holds at most one scheduled timer: the idle auto-roll
//! window, a bot's pacing delay, or the post-move settling window.
//! Scheduling anything cancels whatever was armed before, and every
//! cancel bumps the epoch so a fire that already left the timer task
//! is recognizably stale when the session dequeues it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::state::Seat;
use crate::session::events::Inbound;

pub(crate) struct TurnScheduler {
    tx: mpsc::Sender<Inbound>,
    slot: Option<JoinHandle<()>>,
    epoch: u64,
}

impl TurnScheduler {
    pub fn new(tx: mpsc::Sender<Inbound>) -> Self {
        Self {
            tx,
            slot: None,
            epoch: 0,
        }
    }

    /// Abort any armed timer and invalidate in-flight fires.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.slot.take() {
            handle.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// True when a fire carrying this epoch is still the armed one.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub fn schedule_idle(&mut self, delay: Duration) {
        self.arm(delay, |epoch| Inbound::IdleFired { epoch });
    }

    pub fn schedule_bot(&mut self, seat: Seat, delay: Duration) {
        self.arm(delay, move |epoch| Inbound::BotRoll { seat, epoch });
    }

    pub fn schedule_advance(&mut self, delay: Duration) {
        self.arm(delay, |epoch| Inbound::AdvanceTurn { epoch });
    }

    fn arm(&mut self, delay: Duration, make: impl FnOnce(u64) -> Inbound) {
        self.cancel();
        let msg = make(self.epoch);
        let tx = self.tx.clone();
        self.slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        }));
    }
}

impl Drop for TurnScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.take() {
            handle.abort();
        }
    }
}

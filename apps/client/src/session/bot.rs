//! Dice source for offline play.
//!
//! Drives both bot seats and the local player's offline rolls, plus
//! the small random choices a session needs (starting seat, bot
//! pacing). Seedable so tests are deterministic.

use std::sync::Mutex;
use std::time::Duration;

use rand::prelude::*;

use crate::domain::rules::DIE_SIDES;
use crate::domain::state::Seat;

pub(crate) struct DiceBot {
    /// `Mutex` for interior mutability; callers hold `&self`.
    rng: Mutex<StdRng>,
}

impl DiceBot {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn roll_die(&self) -> u8 {
        self.lock().random_range(1..=DIE_SIDES)
    }

    /// Humanlike pause before a bot acts.
    pub fn pacing_delay(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let span = (max - min).as_millis() as u64;
        let extra = self.lock().random_range(0..=span);
        min + Duration::from_millis(extra)
    }

    /// Uniformly random starting seat among the active ones.
    pub fn pick_start_seat(&self, active: &[Seat]) -> Seat {
        active.choose(&mut *self.lock()).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        // A poisoned RNG is still a usable RNG.
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }
}

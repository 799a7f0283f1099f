//! Freshness evaluation with read-side jitter
//!
//! No expiry timestamp is persisted. A record is fresh when its modification
//! time, pushed back by a random jitter drawn per check, is still inside the
//! lifetime the caller asks for. Spreading the effective expiry of records
//! written together keeps them from all going stale in the same second.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Freshness policy for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryPolicy {
    jitter_window: u64,
}

impl ExpiryPolicy {
    /// Create a policy with the given maximum jitter in seconds
    #[must_use]
    pub const fn new(jitter_window_secs: u64) -> Self {
        Self {
            jitter_window: jitter_window_secs,
        }
    }

    /// Maximum jitter in seconds
    #[must_use]
    pub const fn jitter_window(&self) -> u64 {
        self.jitter_window
    }

    /// Whether a record modified at `modified` is fresh for `lifetime_secs`
    ///
    /// Draws a new jitter value on every call, so two checks of the same record
    /// at the same instant may disagree near the expiry edge.
    #[must_use]
    pub fn is_fresh(&self, modified: Option<DateTime<Utc>>, lifetime_secs: i64) -> bool {
        self.is_fresh_at(modified, lifetime_secs, Utc::now(), &mut rand::rng())
    }

    /// Deterministic form of [`Self::is_fresh`] with an explicit clock and RNG
    #[must_use]
    pub fn is_fresh_at<R: Rng + ?Sized>(
        &self,
        modified: Option<DateTime<Utc>>,
        lifetime_secs: i64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> bool {
        let Some(modified) = modified else {
            return false;
        };
        let jitter = self.draw_jitter(rng);
        let effective = modified.timestamp().saturating_sub(jitter);
        effective > now.timestamp().saturating_sub(lifetime_secs)
    }

    fn draw_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        if self.jitter_window == 0 {
            return 0;
        }
        let drawn = rng.random_range(0..=self.jitter_window);
        i64::try_from(drawn).unwrap_or(i64::MAX)
    }
}

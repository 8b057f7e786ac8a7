use core::time::Duration;

use rand::Rng;

/// Delay policy between allocation attempts.
///
/// The base protocol retries immediately ([`Backoff::None`]). Under heavy
/// contention a growing delay keeps contenders from hammering the lock key in
/// lockstep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same amount before every retry.
    Fixed(Duration),
    /// Wait `base`, then `2 * base`, `4 * base`, ... capped at `max`.
    ///
    /// With `jitter`, the actual delay is drawn uniformly from `[0, delay]`.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Exponential backoff without jitter.
    pub const fn exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            max,
            jitter: false,
        }
    }

    /// The delay to wait before `attempt` (1-based). The first attempt never
    /// waits.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return None;
        }
        match *self {
            Self::None => None,
            Self::Fixed(delay) => Some(delay),
            Self::Exponential { base, max, jitter } => {
                let delay = 2u32
                    .checked_pow(attempt - 2)
                    .and_then(|factor| base.checked_mul(factor))
                    .map_or(max, |delay| delay.min(max));
                if jitter && !delay.is_zero() {
                    Some(rand::rng().random_range(Duration::ZERO..=delay))
                } else {
                    Some(delay)
                }
            }
        }
    }
}

//! Retry backoff for transient manager failures (spec §7): "start 5s,
//! cap 10 min, decorrelated jitter".
//!
//! Backoff lives here, in the engine, rather than in managers —
//! managers only classify a failure as transient or permanent, they
//! never sleep internally (spec §9).

use rand::Rng;
use std::time::Duration;

const BASE: Duration = Duration::from_secs(5);
const CAP: Duration = Duration::from_secs(600);

/// Delay before a transient job's `attempt`-th retry. Full-jitter over
/// an exponentially growing ceiling: the ceiling doubles per attempt
/// up to `CAP`, and the actual delay is drawn uniformly from `[BASE,
/// ceiling]`, so repeated retries decorrelate from one another instead
/// of converging on the same cadence (the thundering-herd failure mode
/// plain exponential backoff without jitter produces).
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let ceiling = BASE
        .saturating_mul(1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX))
        .min(CAP);
    let ceiling_ms = ceiling.as_millis().max(BASE.as_millis()) as u64;
    let base_ms = BASE.as_millis() as u64;
    let delay_ms = rand::thread_rng().gen_range(base_ms..=ceiling_ms);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        for attempt in 0..40 {
            let d = delay_for_attempt(attempt);
            assert!(d <= CAP);
            assert!(d >= BASE);
        }
    }

    #[test]
    fn delay_grows_with_attempt_ceiling() {
        // Not a strict monotonic guarantee (it's randomized), but the
        // ceiling at attempt 10 should exceed the ceiling at attempt 0.
        let first_ceiling = BASE.saturating_mul(1 << 0).min(CAP);
        let later_ceiling = BASE.saturating_mul(1 << 10).min(CAP);
        assert!(later_ceiling >= first_ceiling);
    }
}

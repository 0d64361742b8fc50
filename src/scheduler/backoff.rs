// src/scheduler/backoff.rs

use std::time::Duration;

/// Memory reservation for the next attempt after an OOM kill.
///
/// Tiered bump on the current limit:
/// - `>= 100000 MB` → `+40000`
/// - `>= 20000 MB`  → `+30000`
/// - otherwise      → `+10000`
///
/// The result is never below the peak usage observed on the killed attempt.
pub fn next_memory_limit(current_mb: u64, observed_max_mb: Option<u64>) -> u64 {
    let step = if current_mb >= 100_000 {
        40_000
    } else if current_mb >= 20_000 {
        30_000
    } else {
        10_000
    };
    let bumped = current_mb.saturating_add(step);

    match observed_max_mb {
        Some(observed) if observed > bumped => observed,
        _ => bumped,
    }
}

/// Linear delay before resubmitting after a transient submit failure.
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn submit_retry_delay(base_secs: u64, attempt: u32) -> Duration {
    Duration::from_secs(base_secs.saturating_mul(u64::from(attempt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_match_reference_values() {
        assert_eq!(next_memory_limit(90_000, None), 120_000);
        assert_eq!(next_memory_limit(150_000, None), 190_000);
        assert_eq!(next_memory_limit(15_000, None), 25_000);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(next_memory_limit(19_999, None), 29_999);
        assert_eq!(next_memory_limit(20_000, None), 50_000);
        assert_eq!(next_memory_limit(99_999, None), 129_999);
        assert_eq!(next_memory_limit(100_000, None), 140_000);
    }

    #[test]
    fn observed_peak_wins_when_larger() {
        assert_eq!(next_memory_limit(4_000, Some(60_000)), 60_000);
        assert_eq!(next_memory_limit(4_000, Some(5_000)), 14_000);
    }

    #[test]
    fn retry_delay_is_linear() {
        assert_eq!(submit_retry_delay(30, 1), Duration::from_secs(30));
        assert_eq!(submit_retry_delay(30, 3), Duration::from_secs(90));
        assert_eq!(submit_retry_delay(0, 4), Duration::ZERO);
    }
}

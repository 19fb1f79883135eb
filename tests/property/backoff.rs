//! Backoff strategy invariants.

use std::time::Duration;

use courier_executor::{BackoffStrategy, ExponentialBackoff, FixedDelay};
use proptest::prelude::*;

proptest! {
    #[test]
    fn exponential_backoff_is_monotone_and_capped(
        base_ms in 1u64..5_000,
        attempt in 0u32..64,
    ) {
        let backoff = ExponentialBackoff::new(Duration::from_millis(base_ms));
        let current = backoff.delay(attempt);
        let next = backoff.delay(attempt + 1);
        prop_assert!(next >= current);
        prop_assert!(current <= Duration::from_secs(60));
    }

    #[test]
    fn exponential_backoff_is_deterministic(
        base_ms in 1u64..5_000,
        attempt in 0u32..64,
    ) {
        let backoff = ExponentialBackoff::new(Duration::from_millis(base_ms));
        prop_assert_eq!(backoff.delay(attempt), backoff.delay(attempt));
    }

    #[test]
    fn exponential_backoff_honors_a_custom_ceiling(
        base_ms in 1u64..1_000,
        ceiling_ms in 1u64..120_000,
        attempt in 0u32..64,
    ) {
        let backoff = ExponentialBackoff::new(Duration::from_millis(base_ms))
            .with_ceiling(Duration::from_millis(ceiling_ms));
        prop_assert!(backoff.delay(attempt) <= Duration::from_millis(ceiling_ms));
    }

    #[test]
    fn fixed_delay_ignores_the_attempt(
        delay_ms in 0u64..10_000,
        attempt in 0u32..1_000,
    ) {
        let backoff = FixedDelay::new(Duration::from_millis(delay_ms));
        prop_assert_eq!(backoff.delay(attempt), Duration::from_millis(delay_ms));
    }
}

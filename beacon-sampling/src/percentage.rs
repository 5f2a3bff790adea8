//! Sampling percentage sources.
//!
//! Percentages are normalized to the form `100/N` (N a positive integer)
//! because only those ratios let aggregation reconstruct the original count
//! from the sampled count without bias: a unit kept at `100/N` percent
//! stands for exactly `N` units. The fixed source rounds once at
//! construction; the rate-limited source derives a fresh percentage from a
//! throughput target on every call.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Relative deviation above which rounding is reported to the operator.
const ROUNDING_EPSILON: f64 = 0.01;

/// Rounds a percentage to the nearest value of the form `100/N`.
///
/// Ties round to the smaller `N`, i.e. the larger percentage, keeping more
/// units: `round_to_nearest(40.0) == 50.0`. Zero stays zero.
pub fn round_to_nearest(percentage: f64) -> f64 {
    if percentage == 0.0 {
        return 0.0;
    }
    let item_count = 100.0 / percentage;
    100.0 / (item_count - 0.5).ceil().max(1.0)
}

/// Rounds a percentage down to the nearest value of the form `100/N`.
///
/// Unlike [`round_to_nearest`], the result never exceeds the input, so a
/// percentage derived from a throughput cap keeps honoring the cap.
pub fn round_down_to_nearest(percentage: f64) -> f64 {
    if percentage == 0.0 {
        return 0.0;
    }
    100.0 / (100.0 / percentage).ceil().max(1.0)
}

/// Returns `true` when rounding moved the percentage enough that the
/// operator should be told their configured value is not in effect.
pub fn is_significantly_rounded(original: f64, rounded: f64) -> bool {
    if original == 0.0 {
        return false;
    }
    ((original - rounded) / original).abs() > ROUNDING_EPSILON
}

pub(crate) fn normalize_percentage(requested: f64) -> f64 {
    let rounded = round_to_nearest(requested);
    if is_significantly_rounded(requested, rounded) {
        beacon_log::warn!(
            requested,
            rounded,
            "sampling percentage rounded to a 1-in-N ratio"
        );
    }
    rounded
}

/// The source of the effective default sampling percentage.
#[derive(Debug)]
pub enum SamplingPercentage {
    /// A fixed percentage, normalized at construction.
    Fixed(f64),
    /// A percentage derived from a throughput target on every call.
    RateLimited(RateLimitedPercentage),
}

impl SamplingPercentage {
    /// Creates a fixed source, rounding the percentage to `100/N` form.
    pub fn fixed(percentage: f64) -> Self {
        Self::Fixed(normalize_percentage(percentage))
    }

    /// Creates an adaptive source capping the kept rate at
    /// `target_per_second` items.
    pub fn rate_limited(target_per_second: f64, adaptation_time_seconds: f64) -> Self {
        Self::RateLimited(RateLimitedPercentage::new(
            target_per_second,
            adaptation_time_seconds,
        ))
    }

    /// Returns the percentage to apply to the current unit.
    pub fn get(&self) -> f64 {
        match self {
            Self::Fixed(percentage) => *percentage,
            Self::RateLimited(limiter) => limiter.get(),
        }
    }
}

/// Window state replaced atomically as a unit on every call.
#[derive(Clone, Copy, Debug)]
struct WindowState {
    effective_window_count: f64,
    effective_window_nanos: f64,
    last_nano_time: i64,
}

impl WindowState {
    fn advance(self, nano_time: i64, inverse_adaptation_time_nanos: f64) -> Self {
        let interval_nanos = nano_time - self.last_nano_time;
        if interval_nanos <= 0 {
            // A concurrent call at the same instant contributes one item and
            // no window time.
            return Self {
                effective_window_count: self.effective_window_count + 1.0,
                ..self
            };
        }

        let decay = (-(interval_nanos as f64) * inverse_adaptation_time_nanos).exp();
        Self {
            effective_window_count: self.effective_window_count * decay + 1.0,
            effective_window_nanos: self.effective_window_nanos * decay + interval_nanos as f64,
            last_nano_time: nano_time,
        }
    }
}

/// Derives a sampling percentage from a "kept items per second" target.
///
/// Each call records one observed item into an exponentially decayed window
/// and returns the percentage that caps the long-run kept rate at the
/// target. The window state is replaced through a compare-and-swap loop, so
/// concurrent callers never lose an update and never block.
pub struct RateLimitedPercentage {
    state: ArcSwap<WindowState>,
    inverse_adaptation_time_nanos: f64,
    target_per_nano: f64,
    nano_time: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl RateLimitedPercentage {
    /// Creates a source capping the kept rate at `target_per_second` items,
    /// adapting to rate changes over `adaptation_time_seconds`.
    pub fn new(target_per_second: f64, adaptation_time_seconds: f64) -> Self {
        let start = Instant::now();
        Self::with_nano_time(target_per_second, adaptation_time_seconds, move || {
            i64::try_from(start.elapsed().as_nanos()).unwrap_or(i64::MAX)
        })
    }

    /// Creates a source reading time from the given nanosecond clock.
    pub fn with_nano_time(
        target_per_second: f64,
        adaptation_time_seconds: f64,
        nano_time: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        let initial = WindowState {
            effective_window_count: 0.0,
            effective_window_nanos: 0.0,
            last_nano_time: nano_time(),
        };
        Self {
            state: ArcSwap::from_pointee(initial),
            inverse_adaptation_time_nanos: 1.0 / (adaptation_time_seconds * NANOS_PER_SECOND),
            target_per_nano: target_per_second / NANOS_PER_SECOND,
            nano_time: Box::new(nano_time),
        }
    }

    /// Records one observed item and returns the capping percentage.
    ///
    /// The result is rounded *down* to `100/N` form so that rounding never
    /// pushes the kept rate above the target.
    pub fn get(&self) -> f64 {
        let nano_time = (self.nano_time)();
        let current = loop {
            let previous = self.state.load();
            let next = Arc::new(previous.advance(nano_time, self.inverse_adaptation_time_nanos));
            let swapped = self.state.compare_and_swap(&*previous, Arc::clone(&next));
            if Arc::ptr_eq(&*swapped, &*previous) {
                break next;
            }
        };

        let probability = (current.effective_window_nanos * self.target_per_nano
            / current.effective_window_count)
            .min(1.0);
        let percentage = round_down_to_nearest(100.0 * probability);
        beacon_log::trace!(percentage, "rate limited percentage");
        percentage
    }
}

impl fmt::Debug for RateLimitedPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedPercentage")
            .field("state", &self.state.load())
            .field("target_per_nano", &self.target_per_nano)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    #[test]
    fn round_to_nearest_ratio() {
        assert!((round_to_nearest(34.0) - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(round_to_nearest(26.0), 25.0);
        assert_eq!(round_to_nearest(2.0), 2.0);
        assert_eq!(round_to_nearest(100.0), 100.0);
        assert_eq!(round_to_nearest(0.0), 0.0);
    }

    #[test]
    fn round_to_nearest_ties_keep_more() {
        // 40% sits exactly between 1-in-2 and 1-in-3.
        assert_eq!(round_to_nearest(40.0), 50.0);
    }

    #[test]
    fn round_to_nearest_is_idempotent() {
        for step in 1..=1000 {
            let percentage = step as f64 * 0.1;
            let rounded = round_to_nearest(percentage);
            assert_eq!(round_to_nearest(rounded), rounded, "at {percentage}");
        }
    }

    #[test]
    fn round_down_never_exceeds() {
        assert!((round_down_to_nearest(40.0) - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(round_down_to_nearest(99.99), 50.0);
        for step in 1..=1000 {
            let percentage = step as f64 * 0.1;
            assert!(round_down_to_nearest(percentage) <= percentage + 1e-12);
        }
    }

    #[test]
    fn significant_rounding() {
        assert!(is_significantly_rounded(34.0, round_to_nearest(34.0)));
        assert!(!is_significantly_rounded(50.0, round_to_nearest(50.0)));
        assert!(!is_significantly_rounded(
            100.0 / 3.0,
            round_to_nearest(100.0 / 3.0)
        ));
        assert!(!is_significantly_rounded(0.0, 0.0));
    }

    fn fake_clock() -> (Arc<AtomicI64>, impl Fn() -> i64 + Send + Sync + 'static) {
        let time = Arc::new(AtomicI64::new(0));
        let clock_time = Arc::clone(&time);
        (time, move || clock_time.load(Ordering::SeqCst))
    }

    #[test]
    fn caps_the_kept_rate() {
        beacon_log::init_test!();

        let (time, clock) = fake_clock();
        let limiter = RateLimitedPercentage::with_nano_time(50.0, 1.0, clock);

        // 100 items per second against a target of 50 per second: the
        // percentage must settle at or below 50.
        let mut last = 100.0;
        for call in 0..1000 {
            time.fetch_add(10_000_000, Ordering::SeqCst);
            last = limiter.get();
            if call > 300 {
                assert!(last <= 50.0, "call {call} returned {last}");
            }
        }
        assert_eq!(last, 50.0);
    }

    #[test]
    fn underload_returns_full_percentage() {
        let (time, clock) = fake_clock();
        let limiter = RateLimitedPercentage::with_nano_time(50.0, 1.0, clock);

        // 10 items per second is far below the target of 50.
        let mut last = 0.0;
        for _ in 0..100 {
            time.fetch_add(100_000_000, Ordering::SeqCst);
            last = limiter.get();
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn same_instant_calls_only_count() {
        let (_time, clock) = fake_clock();
        let limiter = RateLimitedPercentage::with_nano_time(50.0, 1.0, clock);

        // The clock never advances: no window time accumulates, so the
        // percentage stays at zero no matter how many items arrive.
        for _ in 0..10 {
            assert_eq!(limiter.get(), 0.0);
        }
    }

    #[test]
    fn zero_target_keeps_nothing() {
        let (time, clock) = fake_clock();
        let limiter = RateLimitedPercentage::with_nano_time(0.0, 1.0, clock);

        for _ in 0..10 {
            time.fetch_add(10_000_000, Ordering::SeqCst);
            assert_eq!(limiter.get(), 0.0);
        }
    }

    #[test]
    fn concurrent_calls_lose_no_updates() {
        let (_time, clock) = fake_clock();
        let limiter = Arc::new(RateLimitedPercentage::with_nano_time(50.0, 1.0, clock));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let limiter = Arc::clone(&limiter);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        limiter.get();
                    }
                });
            }
        });

        // With a frozen clock every call takes the same-instant path, which
        // adds exactly one to the count.
        assert_eq!(limiter.state.load().effective_window_count, 4000.0);
    }
}

//! Common time/period helpers for thermal_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Control period in seconds.
#[inline]
pub fn period_secs(period_ms: u64) -> f32 {
    period_ms.max(1) as f32 / MILLIS_PER_SEC as f32
}

/// Number of whole ticks needed to cover `ms`, rounding up.
/// - Clamps `period_ms` to at least 1 to avoid division by zero.
/// - Returns at least 1 for any non-zero duration.
#[inline]
pub fn ticks_for(ms: u64, period_ms: u64) -> u64 {
    ms.div_ceil(period_ms.max(1))
}

/// Tick count to seconds.
#[inline]
pub fn ticks_to_secs(ticks: u64, period_ms: u64) -> f32 {
    ticks as f32 * period_secs(period_ms)
}

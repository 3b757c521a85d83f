//! Fill value handling.
//!
//! Invalid data is always written as the fill sentinel, never as zero.

/// Fill sentinel used for every output variable.
pub const FILL_VALUE: f64 = 1.0e20;

/// Single-precision fill sentinel.
pub const FILL_VALUE_F32: f32 = 1.0e20;

/// Anything at or above this magnitude is treated as missing.
const FILL_THRESHOLD: f64 = 1.0e19;

/// Check if a value is missing (fill sentinel, NaN or infinite).
#[inline]
pub fn is_fill(value: f64) -> bool {
    !value.is_finite() || value.abs() >= FILL_THRESHOLD
}

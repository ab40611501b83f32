//! Repetition bonus applied to a task's base points.
//!
//! The bonus grows with the natural log of the repetition count and saturates
//! at `MAX_BONUS`, so the first completion of a task in a week is worth exactly
//! its base value and no completion is ever worth more than 1.5x.

use crate::error::{AppError, AppResult};

pub const MAX_BONUS: f64 = 0.5;
pub const BONUS_SCALE: f64 = 3.0;
pub const MAX_MULTIPLIER: f64 = 1.0 + MAX_BONUS;

/// Multiplier for the `count`-th completion of a task within one week.
pub fn multiplier(count: i64) -> AppResult<f64> {
    if count < 1 {
        return Err(AppError::validation(format!(
            "repetition count must be at least 1, got {count}"
        )));
    }

    let repeats = (count - 1) as f64;
    let bonus = MAX_BONUS * (1.0 + repeats).ln() / (1.0 + BONUS_SCALE).ln();
    Ok(1.0 + bonus.min(MAX_BONUS))
}

/// Half-up rounding to whole points.
///
/// Products such as `2 * 1.25` are meant to land on the .5 boundary; snapping
/// to 1e-9 first keeps representation noise from pushing them below it.
pub fn round_points(value: f64) -> f64 {
    let snapped = (value * 1e9).round() / 1e9;
    (snapped + 0.5).floor()
}

/// Awarded points for the `count`-th completion of a task worth `base_points`.
pub fn award_points(base_points: f64, count: i64) -> AppResult<f64> {
    Ok(round_points(base_points * multiplier(count)?))
}

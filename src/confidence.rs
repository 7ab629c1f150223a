//! Confidence Bounder: margin of error from instructor retention, symmetric range
//! clamped to the percentage domain.
//!
//! Canonical margin table (would-take-again %): absent → 5, below 30 → 6,
//! 30..=100 → 4, anything else (out of domain) → 3.

use crate::ratings::DifficultyProfile;

pub fn margin_of_error(difficulty: Option<&DifficultyProfile>) -> f64 {
    match difficulty.and_then(|d| d.would_take_again_percent) {
        None => 5.0,
        Some(p) if p < 30.0 => 6.0,
        Some(p) if (30.0..=100.0).contains(&p) => 4.0,
        Some(_) => 3.0,
    }
}

/// Returns `(margin, [low, high])`; both ends clamped to `[0, 100]`.
pub fn bound(raw_score: f64, difficulty: Option<&DifficultyProfile>) -> (f64, [f64; 2]) {
    let margin = margin_of_error(difficulty);
    let low = (raw_score - margin).clamp(0.0, 100.0);
    let high = (raw_score + margin).clamp(0.0, 100.0);
    (margin, [low, high])
}

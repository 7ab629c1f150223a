//! # Blending Engine
//! Pure, testable logic that maps `(strengths, weights, signals)` → raw predicted score.
//! No I/O, suitable for unit tests and offline evaluation.
//!
//! Base score is the weight-blended category strength. Adjustments are independent
//! and additive (no interaction terms), then the result is clamped to `[0, 100]`.

use crate::analyze::syllabus::mentions_extra_credit;
use crate::analyze::weights::WeightSet;
use crate::category::{Category, CategoryMap};
use crate::prediction::{Adjustment, AdjustmentKind};
use crate::ratings::DifficultyProfile;

pub const PUNCTUALITY_THRESHOLD: f64 = 90.0;
pub const PUNCTUALITY_BONUS: f64 = 2.0;
pub const EXTRA_CREDIT_BONUS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Blend {
    pub base_score: f64,
    pub adjustments: Vec<Adjustment>,
    /// Base + adjustments, clamped to `[0, 100]`.
    pub raw_score: f64,
}

/// `Σ strength[k] * weight[k] / 100`.
pub fn base_score(strengths: &CategoryMap<f64>, weights: &WeightSet) -> f64 {
    Category::ALL
        .iter()
        .map(|&c| strengths.get(c) * weights.get(c) / 100.0)
        .sum()
}

/// Tiered drag from instructor difficulty (5-point scale).
pub fn difficulty_drag(avg_difficulty: f64) -> f64 {
    if (4.0..=5.0).contains(&avg_difficulty) {
        -3.0
    } else if (3.3..4.0).contains(&avg_difficulty) {
        -2.0
    } else if (2.7..3.3).contains(&avg_difficulty) {
        -1.0
    } else {
        0.0
    }
}

pub fn blend(
    strengths: &CategoryMap<f64>,
    weights: &WeightSet,
    difficulty: Option<&DifficultyProfile>,
    punctual_strength: f64,
    syllabus_text: Option<&str>,
) -> Blend {
    let base = base_score(strengths, weights);
    let mut adjustments = Vec::new();

    if let Some(d) = difficulty.and_then(|p| p.avg_difficulty) {
        let delta = difficulty_drag(d);
        if delta != 0.0 {
            adjustments.push(Adjustment::new(
                AdjustmentKind::DifficultyDrag,
                delta,
                format!("Instructor difficulty {d:.1}/5 ({delta:+})"),
            ));
        }
    }

    if punctual_strength > PUNCTUALITY_THRESHOLD {
        adjustments.push(Adjustment::new(
            AdjustmentKind::Punctuality,
            PUNCTUALITY_BONUS,
            format!("Consistently on-time work (punctuality {punctual_strength:.0})"),
        ));
    }

    if syllabus_text.is_some_and(mentions_extra_credit) {
        adjustments.push(Adjustment::new(
            AdjustmentKind::ExtraCredit,
            EXTRA_CREDIT_BONUS,
            "Syllabus offers extra credit or a curve",
        ));
    }

    let total: f64 = base + adjustments.iter().map(|a| a.delta).sum::<f64>();
    Blend {
        base_score: base,
        adjustments,
        raw_score: total.clamp(0.0, 100.0),
    }
}

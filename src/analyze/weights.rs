//! Weight Resolver: syllabus interpretation → normalized category weights.
//!
//! The interpretation collaborator is untrusted. Its `weights` object must carry
//! all four categories as finite, non-negative numbers or the whole result is
//! discarded for the documented fallback (no partial mixing).
//!
//! JSON shape expected from the collaborator:
//! {
//!   "weights": { "projects": 30, "assignments": 30, "exams": 35, "participation": 5 },
//!   "late_policy_strictness": 7
//! }

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::category::{Category, CategoryMap};

/// Documented fallback when the syllabus cannot be interpreted.
pub const FALLBACK_WEIGHTS: CategoryMap<f64> = CategoryMap {
    projects: 25.0,
    assignments: 35.0,
    exams: 35.0,
    participation: 5.0,
};

/// Category weights; non-negative and summing to 100. Only built via [`WeightSet::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightSet(CategoryMap<f64>);

impl WeightSet {
    pub fn fallback() -> Self {
        Self(FALLBACK_WEIGHTS)
    }

    /// Scale so the weights sum to 100. `None` if any weight is negative or
    /// non-finite, or the sum is not positive.
    pub fn normalize(raw: CategoryMap<f64>) -> Option<Self> {
        if raw.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let sum: f64 = raw.iter().map(|(_, w)| *w).sum();
        if !sum.is_finite() || sum <= 0.0 {
            return None;
        }
        Some(Self(raw.map(|_, w| w * 100.0 / sum)))
    }

    pub fn get(&self, category: Category) -> f64 {
        *self.0.get(category)
    }

    pub fn as_map(&self) -> &CategoryMap<f64> {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, w)| *w).sum()
    }
}

/// Why a collaborator-provided weight object was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightRejection {
    NotAnObject,
    Missing(Category),
    Invalid(Category),
    NonPositiveSum,
}

impl fmt::Display for WeightRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightRejection::NotAnObject => write!(f, "weights must be a JSON object"),
            WeightRejection::Missing(c) => write!(f, "weight for `{c}` is missing"),
            WeightRejection::Invalid(c) => {
                write!(f, "weight for `{c}` is not a non-negative number")
            }
            WeightRejection::NonPositiveSum => write!(f, "weights sum to zero or less"),
        }
    }
}

/// Field-by-field validation of a raw weights object.
pub fn validate_weights(raw: &Value) -> Result<CategoryMap<f64>, WeightRejection> {
    let obj = raw.as_object().ok_or(WeightRejection::NotAnObject)?;
    let mut out = CategoryMap::<f64>::default();
    for c in Category::ALL {
        let v = obj.get(c.as_str()).ok_or(WeightRejection::Missing(c))?;
        let w = v
            .as_f64()
            .filter(|w| w.is_finite() && *w >= 0.0)
            .ok_or(WeightRejection::Invalid(c))?;
        *out.get_mut(c) = w;
    }
    Ok(out)
}

/// Validate + normalize; the rejection explains a fallback.
pub fn weights_from_value(raw: &Value) -> Result<WeightSet, WeightRejection> {
    let checked = validate_weights(raw)?;
    WeightSet::normalize(checked).ok_or(WeightRejection::NonPositiveSum)
}

/// Accepts the full interpretation object (with a `weights` key) or a bare weights object.
pub fn weights_from_interpretation(interpretation: &Value) -> Result<WeightSet, WeightRejection> {
    match interpretation.get("weights") {
        Some(inner) => weights_from_value(inner),
        None => weights_from_value(interpretation),
    }
}

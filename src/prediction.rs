//! prediction.rs: output shapes for a grade prediction (score, range, adjustments,
//! non-fatal notes) plus the letter-grade scale.

use serde::Serialize;

use crate::analyze::weights::WeightSet;
use crate::category::CategoryMap;
use crate::ratings::DifficultyProfile;

/// Rule-based adjustment applied on top of the weighted base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    DifficultyDrag,
    Punctuality,
    ExtraCredit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    pub kind: AdjustmentKind,
    pub delta: f64,
    pub message: String,
}

impl Adjustment {
    pub fn new(kind: AdjustmentKind, delta: f64, message: impl Into<String>) -> Self {
        Self {
            kind,
            delta,
            message: message.into(),
        }
    }
}

/// Pipeline stage a non-fatal note refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Syllabus,
    Weights,
    Strictness,
    Ratings,
    TargetCourse,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Syllabus => "syllabus",
            Stage::Weights => "weights",
            Stage::Strictness => "strictness",
            Stage::Ratings => "ratings",
            Stage::TargetCourse => "target_course",
        }
    }
}

/// A collaborator failure that was recovered with a local fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub stage: Stage,
    pub message: String,
}

impl Note {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsSource {
    Syllabus,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub category_strengths: CategoryMap<f64>,
    pub overall_strength: f64,
    pub punctual_strength: f64,
    pub weights: WeightSet,
    pub weights_source: WeightsSource,
    pub final_score: f64,
    pub margin_of_error: f64,
    /// `[low, high]`, both within `[0, 100]`.
    pub range: [f64; 2],
    pub letter_grade: &'static str,
    pub late_policy_strictness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_profile: Option<DifficultyProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

/// Standard plus/minus scale.
pub fn letter_grade(score: f64) -> &'static str {
    const SCALE: &[(f64, &str)] = &[
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (67.0, "D+"),
        (63.0, "D"),
        (60.0, "D-"),
    ];
    SCALE
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, g)| *g)
        .unwrap_or("F")
}

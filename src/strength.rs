//! Historical Strength Estimator.
//!
//! Averages per-category percents over every cached course summary, then applies
//! the null-substitution policy exactly once so downstream blending only ever sees
//! fully populated strengths.

use serde::{Deserialize, Serialize};

use crate::aggregate::LatenessCount;
use crate::category::{CategoryMap, CategoryPercent};
use crate::lms::types::CourseSummary;

/// Neutral prior used when no category has any historical data.
pub const NEUTRAL_PRIOR: f64 = 85.0;
/// Late-policy strictness when the syllabus interpretation is unavailable ("flexible extensions").
pub const DEFAULT_STRICTNESS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalStrengthProfile {
    pub category_strengths: CategoryMap<f64>,
    pub overall_strength: f64,
    pub punctual_strength: f64,
}

impl HistoricalStrengthProfile {
    pub fn with_punctuality(mut self, punctual_strength: f64) -> Self {
        self.punctual_strength = punctual_strength.clamp(0.0, 100.0);
        self
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Per-category means over all summaries; `None` where no course has data.
pub fn category_means(summaries: &[CourseSummary]) -> CategoryPercent {
    CategoryMap::from_fn(|c| {
        mean(
            summaries
                .iter()
                .filter_map(|s| *s.category_percents.get(c)),
        )
    })
}

/// Replace null category means with the mean of the non-null ones (or the neutral prior).
pub fn substitute_nulls(means: &CategoryPercent) -> CategoryMap<f64> {
    let default_overall = mean(means.iter().filter_map(|(_, v)| *v)).unwrap_or(NEUTRAL_PRIOR);
    means.map(|_, v| v.unwrap_or(default_overall).clamp(0.0, 100.0))
}

pub fn estimate(summaries: &[CourseSummary]) -> HistoricalStrengthProfile {
    let strengths = substitute_nulls(&category_means(summaries));
    let overall = mean(strengths.iter().map(|(_, v)| *v)).unwrap_or(NEUTRAL_PRIOR);
    HistoricalStrengthProfile {
        category_strengths: strengths,
        overall_strength: overall.clamp(0.0, 100.0),
        punctual_strength: 100.0,
    }
}

/// `100 - late_rate * strictness * 50`, clamped. No lateness signal → 100.
pub fn punctual_strength(lateness: Option<LatenessCount>, strictness: f64) -> f64 {
    let Some(rate) = lateness.and_then(|l| l.late_rate()) else {
        return 100.0;
    };
    (100.0 - rate * strictness * 50.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(p: CategoryPercent) -> CourseSummary {
        CourseSummary {
            course_id: 1,
            name: "Course".into(),
            code: "C 101".into(),
            term: None,
            final_grade: None,
            final_score: None,
            category_percents: p,
            error: None,
            fetched_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn all_null_history_yields_neutral_prior() {
        let rows = vec![summary(CategoryMap::default()), summary(CategoryMap::default())];
        let p = estimate(&rows);
        assert_eq!(p.overall_strength, 85.0);
        for (_, v) in p.category_strengths.iter() {
            assert_eq!(*v, 85.0);
        }
        assert_eq!(p.punctual_strength, 100.0);
    }

    #[test]
    fn means_skip_nulls_and_fill_from_known_categories() {
        let rows = vec![
            summary(CategoryMap {
                projects: Some(90.0),
                assignments: Some(80.0),
                exams: None,
                participation: None,
            }),
            summary(CategoryMap {
                projects: Some(70.0),
                assignments: None,
                exams: None,
                participation: None,
            }),
        ];
        let p = estimate(&rows);
        assert_eq!(p.category_strengths.projects, 80.0);
        assert_eq!(p.category_strengths.assignments, 80.0);
        // default_overall = mean(80, 80)
        assert_eq!(p.category_strengths.exams, 80.0);
        assert_eq!(p.category_strengths.participation, 80.0);
        assert_eq!(p.overall_strength, 80.0);
    }

    #[test]
    fn empty_history_is_neutral() {
        let p = estimate(&[]);
        assert_eq!(p.overall_strength, NEUTRAL_PRIOR);
    }

    #[test]
    fn punctuality_formula_and_bounds() {
        let none = punctual_strength(None, 5.0);
        assert_eq!(none, 100.0);
        let empty = punctual_strength(Some(LatenessCount::default()), 5.0);
        assert_eq!(empty, 100.0);

        let some = LatenessCount { late: 1, gradable: 10 };
        assert!((punctual_strength(Some(some), 5.0) - 75.0).abs() < 1e-9);

        let all_late = LatenessCount { late: 10, gradable: 10 };
        assert_eq!(punctual_strength(Some(all_late), 10.0), 0.0);
    }
}

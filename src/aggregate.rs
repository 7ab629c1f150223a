//! Course Aggregator: one course's assignment groups + submissions → per-category percent.
//!
//! Inside a group, points are pooled per category. Across groups that land on the
//! same category the group percents are merged by a running two-value average
//! (not points-weighted). Known approximation, kept for parity with past results.

use std::collections::HashMap;

use crate::category::{classify, CategoryMap, CategoryPercent};
use crate::lms::types::{Assignment, AssignmentGroup, Submission};

#[derive(Debug, Clone, Copy, Default)]
struct Acc {
    earned: f64,
    total: f64,
}

/// Returns the submission's score when the assignment is gradable:
/// positive points, a present score, and not excused.
fn gradable_score(assignment: &Assignment, sub: Option<&Submission>) -> Option<f64> {
    if assignment.points_possible <= 0.0 || !assignment.points_possible.is_finite() {
        return None;
    }
    let sub = sub?;
    if sub.excused {
        return None;
    }
    sub.score.filter(|s| s.is_finite())
}

fn by_assignment(submissions: &[Submission]) -> HashMap<u64, &Submission> {
    submissions.iter().map(|s| (s.assignment_id, s)).collect()
}

pub fn aggregate(groups: &[AssignmentGroup], submissions: &[Submission]) -> CategoryPercent {
    let lookup = by_assignment(submissions);
    let mut out = CategoryPercent::default();

    for group in groups {
        let mut accs: CategoryMap<Acc> = CategoryMap::default();
        for a in &group.assignments {
            let Some(score) = gradable_score(a, lookup.get(&a.id).copied()) else {
                continue;
            };
            let acc = accs.get_mut(classify(&a.name, &group.name));
            acc.earned += score;
            acc.total += a.points_possible;
        }

        for (category, acc) in accs.iter() {
            if acc.total <= 0.0 {
                continue;
            }
            let pct = (acc.earned / acc.total * 100.0).clamp(0.0, 100.0);
            let slot = out.get_mut(category);
            *slot = Some(match *slot {
                Some(prev) => (prev + pct) / 2.0,
                None => pct,
            });
        }
    }

    out
}

/// Late / gradable counts for one course (excused and ungraded work excluded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatenessCount {
    pub late: usize,
    pub gradable: usize,
}

impl LatenessCount {
    pub fn late_rate(&self) -> Option<f64> {
        if self.gradable == 0 {
            None
        } else {
            Some(self.late as f64 / self.gradable as f64)
        }
    }
}

pub fn count_lateness(groups: &[AssignmentGroup], submissions: &[Submission]) -> LatenessCount {
    let lookup = by_assignment(submissions);
    let mut count = LatenessCount::default();
    for a in groups.iter().flat_map(|g| g.assignments.iter()) {
        let sub = lookup.get(&a.id).copied();
        if gradable_score(a, sub).is_none() {
            continue;
        }
        count.gradable += 1;
        if sub.is_some_and(|s| s.late) {
            count.late += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asg(id: u64, name: &str, pts: f64) -> Assignment {
        Assignment {
            id,
            name: name.to_string(),
            points_possible: pts,
            html_url: None,
        }
    }
    fn grp(name: &str, assignments: Vec<Assignment>) -> AssignmentGroup {
        AssignmentGroup {
            name: name.to_string(),
            group_weight: 0.0,
            assignments,
        }
    }
    fn sub(id: u64, score: Option<f64>, late: bool, excused: bool) -> Submission {
        Submission {
            assignment_id: id,
            score,
            late,
            excused,
        }
    }

    #[test]
    fn pools_points_within_a_group() {
        let groups = vec![grp(
            "Homework",
            vec![asg(1, "HW 1", 10.0), asg(2, "HW 2", 30.0)],
        )];
        let subs = vec![sub(1, Some(10.0), false, false), sub(2, Some(15.0), false, false)];
        let p = aggregate(&groups, &subs);
        assert!((p.assignments.unwrap() - 62.5).abs() < 1e-9);
        assert_eq!(p.exams, None);
        assert_eq!(p.projects, None);
        assert_eq!(p.participation, None);
    }

    #[test]
    fn merges_groups_by_simple_average() {
        // Two exam groups with very different point volumes: simple average, not pooled.
        let groups = vec![
            grp("Midterms", vec![asg(1, "Midterm", 100.0)]),
            grp("Quizzes", vec![asg(2, "Quiz 1", 10.0)]),
        ];
        let subs = vec![sub(1, Some(60.0), false, false), sub(2, Some(10.0), false, false)];
        let p = aggregate(&groups, &subs);
        assert!((p.exams.unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn skips_excused_ungraded_and_zero_point_work() {
        let groups = vec![grp(
            "Projects",
            vec![
                asg(1, "Project 1", 50.0),
                asg(2, "Project 2", 50.0),
                asg(3, "Project 3", 0.0),
                asg(4, "Project 4", 50.0),
            ],
        )];
        let subs = vec![
            sub(1, Some(40.0), false, false),
            sub(2, Some(0.0), false, true),
            sub(3, Some(5.0), false, false),
            sub(4, None, false, false),
        ];
        let p = aggregate(&groups, &subs);
        assert!((p.projects.unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn category_without_gradable_work_is_null_not_zero() {
        let groups = vec![grp("Participation", vec![asg(1, "Attendance", 5.0)])];
        let p = aggregate(&groups, &[]);
        assert_eq!(p.participation, None);
    }

    #[test]
    fn extra_credit_over_100_is_clamped() {
        let groups = vec![grp("Homework", vec![asg(1, "HW", 10.0)])];
        let p = aggregate(&groups, &[sub(1, Some(12.0), false, false)]);
        assert_eq!(p.assignments, Some(100.0));
    }

    #[test]
    fn lateness_counts_only_gradable_work() {
        let groups = vec![grp(
            "Homework",
            vec![asg(1, "HW 1", 10.0), asg(2, "HW 2", 10.0), asg(3, "HW 3", 10.0)],
        )];
        let subs = vec![
            sub(1, Some(9.0), true, false),
            sub(2, Some(8.0), false, false),
            sub(3, Some(0.0), true, true),
        ];
        let c = count_lateness(&groups, &subs);
        assert_eq!(c, LatenessCount { late: 1, gradable: 2 });
        assert_eq!(c.late_rate(), Some(0.5));
        assert_eq!(LatenessCount::default().late_rate(), None);
    }
}

// src/lms/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::category::CategoryPercent;

/// A course as listed by the learning-management system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub term: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub points_possible: f64,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentGroup {
    pub name: String,
    #[serde(default)]
    pub group_weight: f64,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub assignment_id: u64,
    pub score: Option<f64>,
    #[serde(default)]
    pub late: bool,
    #[serde(default)]
    pub excused: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentGrades {
    pub final_grade: Option<String>,
    pub final_score: Option<f64>,
}

/// Optional listing filters (Canvas `enrollment_state`, e.g. "completed").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CourseFilter {
    #[serde(default)]
    pub enrollment_state: Option<String>,
}

/// One historical course, aggregated. Never mutated after creation; a refresh
/// replaces the whole row. `error` marks a course whose fetch failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseSummary {
    pub course_id: u64,
    pub name: String,
    pub code: String,
    pub term: Option<String>,
    pub final_grade: Option<String>,
    pub final_score: Option<f64>,
    pub category_percents: CategoryPercent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

impl CourseSummary {
    /// Summary row for a course whose fetch failed; all categories null.
    pub fn failed(course: &Course, error: impl Into<String>) -> Self {
        Self {
            course_id: course.id,
            name: course.name.clone(),
            code: course.code.clone(),
            term: course.term.clone(),
            final_grade: None,
            final_score: None,
            category_percents: CategoryPercent::default(),
            error: Some(error.into()),
            fetched_at: chrono::Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Learning-management data source. Each call may fail independently.
#[async_trait::async_trait]
pub trait LmsSource: Send + Sync {
    async fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<Course>>;
    async fn course(&self, course_id: u64) -> Result<Course>;
    async fn assignment_groups(&self, course_id: u64) -> Result<Vec<AssignmentGroup>>;
    async fn submissions(&self, course_id: u64) -> Result<Vec<Submission>>;
    async fn enrollment_grades(&self, course_id: u64) -> Result<EnrollmentGrades>;
    /// Raw syllabus body (HTML) if the course publishes one.
    async fn syllabus(&self, course_id: u64) -> Result<Option<String>>;
    fn name(&self) -> &'static str;
}

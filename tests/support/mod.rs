// tests/support/mod.rs
//
// In-process collaborators for integration tests: a scripted LMS, a scripted
// ratings lookup, and helpers to build a Predictor around them.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use grade_predictor::ai_adapter::{
    AiClient, AiError, BoxFuture, CachingClient, DisabledClient, DynAiClient, ExplainRequest,
    FailingProvider, MockProvider,
};
use grade_predictor::history::HistoryStore;
use grade_predictor::lms::types::{
    Assignment, AssignmentGroup, Course, CourseFilter, EnrollmentGrades, LmsSource, Submission,
};
use grade_predictor::ratings::{InstructorProfile, RatingsLookup};
use grade_predictor::Predictor;

pub const GOOD_COURSE: u64 = 101;
pub const BROKEN_COURSE: u64 = 102;
pub const TARGET_COURSE: u64 = 200;
pub const KNOWN_INSTRUCTOR: &str = "200147";

fn assignment(id: u64, name: &str, points: f64) -> Assignment {
    Assignment {
        id,
        name: name.into(),
        points_possible: points,
        html_url: None,
    }
}

fn group(name: &str, assignments: Vec<Assignment>) -> AssignmentGroup {
    AssignmentGroup {
        name: name.into(),
        group_weight: 25.0,
        assignments,
    }
}

fn sub(assignment_id: u64, score: f64, late: bool) -> Submission {
    Submission {
        assignment_id,
        score: Some(score),
        late,
        excused: false,
    }
}

/// Course 101 aggregates to projects 90, assignments 80, exams 70, participation 100.
/// Course 102 fails on every call. Course 200 is the target: 1 of 4 submissions late.
pub struct ScriptedLms {
    pub list_fails: bool,
    pub target_fails: bool,
    pub syllabus_html: Option<String>,
}

impl Default for ScriptedLms {
    fn default() -> Self {
        Self {
            list_fails: false,
            target_fails: false,
            syllabus_html: Some(
                "<h2>Grading</h2><p>Projects 30%, Homework 30%, Exams 35%, Participation 5%.</p>\
                 <p>Extra&nbsp;credit is available on every problem set.</p>"
                    .into(),
            ),
        }
    }
}

fn course(id: u64, name: &str) -> Course {
    Course {
        id,
        name: name.into(),
        code: format!("CS {id}"),
        term: Some("Fall 2024".into()),
    }
}

#[async_trait]
impl LmsSource for ScriptedLms {
    async fn list_courses(&self, _filter: &CourseFilter) -> Result<Vec<Course>> {
        if self.list_fails {
            return Err(anyhow!("HTTP 401 Unauthorized"));
        }
        Ok(vec![
            course(GOOD_COURSE, "Data Structures"),
            course(BROKEN_COURSE, "Compilers"),
        ])
    }

    async fn course(&self, course_id: u64) -> Result<Course> {
        match course_id {
            GOOD_COURSE => Ok(course(GOOD_COURSE, "Data Structures")),
            BROKEN_COURSE => Ok(course(BROKEN_COURSE, "Compilers")),
            TARGET_COURSE => Ok(course(TARGET_COURSE, "Operating Systems")),
            other => Err(anyhow!("HTTP 404 course {other}")),
        }
    }

    async fn assignment_groups(&self, course_id: u64) -> Result<Vec<AssignmentGroup>> {
        match course_id {
            GOOD_COURSE => Ok(vec![
                group("Exams", vec![assignment(1, "Midterm 1", 100.0)]),
                group("Projects", vec![assignment(2, "Project 1", 50.0)]),
                group("Homework", vec![assignment(3, "Homework 1", 10.0)]),
                group("Participation", vec![assignment(4, "Attendance", 10.0)]),
            ]),
            TARGET_COURSE if !self.target_fails => Ok(vec![group(
                "Homework",
                vec![
                    assignment(21, "Homework 1", 10.0),
                    assignment(22, "Homework 2", 10.0),
                    assignment(23, "Homework 3", 10.0),
                    assignment(24, "Homework 4", 10.0),
                ],
            )]),
            _ => Err(anyhow!("HTTP 500 assignment groups")),
        }
    }

    async fn submissions(&self, course_id: u64) -> Result<Vec<Submission>> {
        match course_id {
            GOOD_COURSE => Ok(vec![
                sub(1, 70.0, false),
                sub(2, 45.0, false),
                sub(3, 8.0, false),
                sub(4, 10.0, false),
            ]),
            TARGET_COURSE if !self.target_fails => Ok(vec![
                sub(21, 9.0, false),
                sub(22, 9.0, true),
                sub(23, 10.0, false),
                sub(24, 7.0, false),
            ]),
            _ => Err(anyhow!("HTTP 500 submissions")),
        }
    }

    async fn enrollment_grades(&self, course_id: u64) -> Result<EnrollmentGrades> {
        match course_id {
            GOOD_COURSE => Ok(EnrollmentGrades {
                final_grade: Some("B".into()),
                final_score: Some(84.5),
            }),
            _ => Err(anyhow!("HTTP 500 enrollments")),
        }
    }

    async fn syllabus(&self, course_id: u64) -> Result<Option<String>> {
        match course_id {
            TARGET_COURSE if !self.target_fails => Ok(self.syllabus_html.clone()),
            _ => Err(anyhow!("HTTP 500 syllabus")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Knows one instructor (difficulty 3.5, 75% would take again); fails otherwise.
pub struct ScriptedRatings;

#[async_trait]
impl RatingsLookup for ScriptedRatings {
    async fn instructor_profile(&self, instructor_id: &str) -> Result<InstructorProfile> {
        if instructor_id == KNOWN_INSTRUCTOR {
            Ok(InstructorProfile {
                name: Some("Ada Lovelace".into()),
                avg_rating: Some(4.1),
                avg_difficulty: Some(3.5),
                num_ratings: Some(57),
                would_take_again_percent: Some(75.0),
            })
        } else {
            Err(anyhow!("instructor {instructor_id} not found"))
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Never answers within any test timeout.
pub const STALL: Duration = Duration::from_secs(30);

pub struct SlowRatings;

#[async_trait]
impl RatingsLookup for SlowRatings {
    async fn instructor_profile(&self, _instructor_id: &str) -> Result<InstructorProfile> {
        tokio::time::sleep(STALL).await;
        Err(anyhow!("unreachable"))
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Panics on lookup, standing in for a bug inside the prediction task.
pub struct PanickingRatings;

#[async_trait]
impl RatingsLookup for PanickingRatings {
    async fn instructor_profile(&self, instructor_id: &str) -> Result<InstructorProfile> {
        panic!("ratings lookup bug for {instructor_id}");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

pub struct SlowAi;

impl AiClient for SlowAi {
    fn interpret_syllabus<'a>(
        &'a self,
        _syllabus: &'a str,
    ) -> BoxFuture<'a, std::result::Result<serde_json::Value, AiError>> {
        Box::pin(async {
            tokio::time::sleep(STALL).await;
            Err(AiError::Provider("unreachable".into()))
        })
    }

    fn explain<'a>(&'a self, _req: &'a ExplainRequest) -> BoxFuture<'a, std::result::Result<String, AiError>> {
        Box::pin(async {
            tokio::time::sleep(STALL).await;
            Err(AiError::Provider("unreachable".into()))
        })
    }

    fn provider_name(&self) -> &'static str {
        "slow"
    }
}

pub enum Ai {
    Mock,
    Failing,
    Disabled,
}

/// Keeps the AI cache directory alive for the duration of a test.
pub struct Harness {
    pub predictor: Predictor,
    _ai_cache: tempfile::TempDir,
}

impl Harness {
    pub fn into_parts(self) -> (Predictor, tempfile::TempDir) {
        (self.predictor, self._ai_cache)
    }
}

pub fn ai_client(kind: Ai, dir: &tempfile::TempDir) -> DynAiClient {
    let path = dir.path().to_path_buf();
    match kind {
        Ai::Mock => Arc::new(CachingClient::new(MockProvider::default(), path, 50)),
        Ai::Failing => Arc::new(CachingClient::new(FailingProvider, path, 50)),
        Ai::Disabled => Arc::new(DisabledClient),
    }
}

pub fn harness(lms: ScriptedLms, ai: Ai, store: HistoryStore) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let predictor = Predictor::new(
        Arc::new(lms),
        ai_client(ai, &dir),
        Arc::new(ScriptedRatings),
        Arc::new(store),
    );
    Harness {
        predictor,
        _ai_cache: dir,
    }
}

/// Predictor whose cache already holds one refresh of the scripted LMS.
pub async fn refreshed(ai: Ai) -> Harness {
    let h = harness(ScriptedLms::default(), ai, HistoryStore::in_memory(None));
    h.predictor.refresh_all().await.expect("refresh");
    h
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

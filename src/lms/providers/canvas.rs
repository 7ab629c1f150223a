//! Canvas LMS REST client (`/api/v1`), bearer-token auth, `Link` header pagination.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::lms::types::{
    Assignment, AssignmentGroup, Course, CourseFilter, EnrollmentGrades, LmsSource, Submission,
};

/// Upper bound on followed pages per listing.
const MAX_PAGES: usize = 50;

pub struct CanvasClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct RawTerm {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCourse {
    id: u64,
    name: Option<String>,
    course_code: Option<String>,
    term: Option<RawTerm>,
    syllabus_body: Option<String>,
}

impl RawCourse {
    fn into_course(self) -> Course {
        Course {
            id: self.id,
            name: self.name.unwrap_or_default(),
            code: self.course_code.unwrap_or_default(),
            term: self.term.and_then(|t| t.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAssignment {
    id: u64,
    name: Option<String>,
    points_possible: Option<f64>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: Option<String>,
    group_weight: Option<f64>,
    #[serde(default)]
    assignments: Vec<RawAssignment>,
}

#[derive(Debug, Deserialize)]
struct RawSubmission {
    assignment_id: u64,
    score: Option<f64>,
    #[serde(default)]
    late: bool,
    #[serde(default)]
    excused: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawEnrollment {
    grades: Option<RawGrades>,
}

#[derive(Debug, Deserialize)]
struct RawGrades {
    final_grade: Option<String>,
    final_score: Option<f64>,
}

/// Extract the `rel="next"` URL from a Canvas `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("link regex"));
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl CanvasClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        per_page: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("grade-predictor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building canvas http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            per_page: per_page.clamp(1, 100),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding {url}"))
    }

    /// GET every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let t0 = std::time::Instant::now();
        let mut out = Vec::new();
        let mut query: Vec<(&str, String)> = query.to_vec();
        query.push(("per_page", self.per_page.to_string()));

        let mut next = Some(self.url(path));
        let mut first = true;
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(anyhow!("pagination exceeded {MAX_PAGES} pages for {path}"));
            }
            let mut req = self.http.get(&url).bearer_auth(&self.token);
            // Canvas `next` links already carry the query string.
            if first {
                req = req.query(&query);
                first = false;
            }
            let resp = req
                .send()
                .await
                .with_context(|| format!("GET {path}"))?
                .error_for_status()
                .with_context(|| format!("GET {path}"))?;
            next = resp
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|h| h.to_str().ok())
                .and_then(next_link);
            let mut page: Vec<T> = resp
                .json()
                .await
                .with_context(|| format!("decoding {path}"))?;
            out.append(&mut page);
        }

        histogram!("canvas_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("canvas_pages_total").increment(pages as u64);
        Ok(out)
    }
}

#[async_trait]
impl LmsSource for CanvasClient {
    async fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        let mut query = vec![("include[]", "term".to_string())];
        if let Some(state) = &filter.enrollment_state {
            query.push(("enrollment_state", state.clone()));
        }
        let raw: Vec<RawCourse> = self.get_all("/courses", &query).await?;
        Ok(raw.into_iter().map(RawCourse::into_course).collect())
    }

    async fn course(&self, course_id: u64) -> Result<Course> {
        let raw: RawCourse = self
            .get_json(
                &self.url(&format!("/courses/{course_id}")),
                &[("include[]", "term".to_string())],
            )
            .await?;
        Ok(raw.into_course())
    }

    async fn assignment_groups(&self, course_id: u64) -> Result<Vec<AssignmentGroup>> {
        let raw: Vec<RawGroup> = self
            .get_all(
                &format!("/courses/{course_id}/assignment_groups"),
                &[("include[]", "assignments".to_string())],
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|g| AssignmentGroup {
                name: g.name.unwrap_or_default(),
                group_weight: g.group_weight.unwrap_or(0.0),
                assignments: g
                    .assignments
                    .into_iter()
                    .map(|a| Assignment {
                        id: a.id,
                        name: a.name.unwrap_or_default(),
                        points_possible: a.points_possible.unwrap_or(0.0),
                        html_url: a.html_url,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn submissions(&self, course_id: u64) -> Result<Vec<Submission>> {
        let raw: Vec<RawSubmission> = self
            .get_all(
                &format!("/courses/{course_id}/students/submissions"),
                &[("student_ids[]", "self".to_string())],
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|s| Submission {
                assignment_id: s.assignment_id,
                score: s.score,
                late: s.late,
                excused: s.excused.unwrap_or(false),
            })
            .collect())
    }

    async fn enrollment_grades(&self, course_id: u64) -> Result<EnrollmentGrades> {
        let raw: Vec<RawEnrollment> = self
            .get_all(
                &format!("/courses/{course_id}/enrollments"),
                &[
                    ("user_id", "self".to_string()),
                    ("type[]", "StudentEnrollment".to_string()),
                ],
            )
            .await?;
        let grades = raw.into_iter().find_map(|e| e.grades);
        Ok(grades
            .map(|g| EnrollmentGrades {
                final_grade: g.final_grade,
                final_score: g.final_score,
            })
            .unwrap_or_default())
    }

    async fn syllabus(&self, course_id: u64) -> Result<Option<String>> {
        let raw: RawCourse = self
            .get_json(
                &self.url(&format!("/courses/{course_id}")),
                &[("include[]", "syllabus_body".to_string())],
            )
            .await?;
        Ok(raw.syllabus_body.filter(|s| !s.trim().is_empty()))
    }

    fn name(&self) -> &'static str {
        "canvas"
    }
}

// src/lms/mod.rs
pub mod providers;
pub mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use metrics::{counter, describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregate::aggregate;
use crate::lms::types::{Course, CourseFilter, CourseSummary, LmsSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_runs_total", "Full course-cache refresh runs.");
        describe_counter!(
            "refresh_course_failures_total",
            "Courses whose fetch failed during refresh."
        );
        describe_gauge!("history_courses", "Course summaries currently cached.");
    });
}

/// Bounds applied to every collaborator call during a refresh.
#[derive(Debug, Clone, Copy)]
pub struct RefreshLimits {
    pub call_timeout: Duration,
    pub concurrency: usize,
}

impl Default for RefreshLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            concurrency: 4,
        }
    }
}

/// Await `fut` with a deadline; a timeout is reported as an ordinary failure.
pub async fn with_timeout<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => r,
        Err(_) => Err(anyhow!("{what} timed out after {}ms", limit.as_millis())),
    }
}

/// Fetch and aggregate a single course. Any failed call fails this course only.
pub async fn summarize_course(
    source: &dyn LmsSource,
    course: &Course,
    call_timeout: Duration,
) -> Result<CourseSummary> {
    let groups = with_timeout(
        "assignment groups",
        call_timeout,
        source.assignment_groups(course.id),
    )
    .await?;
    let submissions =
        with_timeout("submissions", call_timeout, source.submissions(course.id)).await?;
    let grades = with_timeout(
        "enrollment grades",
        call_timeout,
        source.enrollment_grades(course.id),
    )
    .await?;

    Ok(CourseSummary {
        course_id: course.id,
        name: course.name.clone(),
        code: course.code.clone(),
        term: course.term.clone(),
        final_grade: grades.final_grade,
        final_score: grades.final_score.map(|s| s.clamp(0.0, 100.0)),
        category_percents: aggregate(&groups, &submissions),
        error: None,
        fetched_at: chrono::Utc::now(),
    })
}

/// Summarize, folding a failure into an error-marked row.
pub async fn summarize_or_mark(
    source: &dyn LmsSource,
    course: &Course,
    call_timeout: Duration,
) -> CourseSummary {
    match summarize_course(source, course, call_timeout).await {
        Ok(s) => {
            tracing::info!(target: "refresh", course_id = course.id, "course summarized");
            s
        }
        Err(e) => {
            tracing::warn!(target: "refresh", course_id = course.id, error = %e, "course fetch failed");
            counter!("refresh_course_failures_total").increment(1);
            CourseSummary::failed(course, e.to_string())
        }
    }
}

/// Rebuild every course summary. Listing failure aborts; per-course failures are
/// embedded inline. Output order follows the listing.
pub async fn refresh_all(
    source: Arc<dyn LmsSource>,
    filter: &CourseFilter,
    limits: RefreshLimits,
) -> Result<Vec<CourseSummary>> {
    ensure_metrics_described();
    counter!("refresh_runs_total").increment(1);

    let courses = with_timeout(
        "course listing",
        limits.call_timeout,
        source.list_courses(filter),
    )
    .await?;
    tracing::info!(target: "refresh", provider = source.name(), courses = courses.len(), "refresh started");

    let permits = Arc::new(Semaphore::new(limits.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (idx, course) in courses.iter().cloned().enumerate() {
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let summary = summarize_or_mark(source.as_ref(), &course, limits.call_timeout).await;
            (idx, summary)
        });
    }

    let mut slots: Vec<Option<CourseSummary>> = vec![None; courses.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, summary)) => slots[idx] = Some(summary),
            Err(e) => tracing::error!(target: "refresh", error = %e, "refresh task panicked"),
        }
    }

    let out: Vec<CourseSummary> = slots
        .into_iter()
        .zip(courses.iter())
        .map(|(slot, course)| {
            slot.unwrap_or_else(|| CourseSummary::failed(course, "refresh task aborted"))
        })
        .collect();

    let failed = out.iter().filter(|s| s.is_failed()).count();
    tracing::info!(target: "refresh", total = out.len(), failed, "refresh finished");
    Ok(out)
}

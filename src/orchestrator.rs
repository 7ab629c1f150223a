//! Prediction Orchestrator: history snapshot → strengths → syllabus weights →
//! instructor difficulty → blend → bounds. Also owns the refresh operations that
//! rebuild the course cache.
//!
//! Only an absent or empty course cache stops a prediction. Every collaborator
//! failure is replaced by its local fallback and recorded as a `Note`.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::aggregate::{count_lateness, LatenessCount};
use crate::analyze::ai_adapter::{DynAiClient, ExplainRequest};
use crate::analyze::syllabus::{fingerprint, html_to_text, normalize_text};
use crate::analyze::{read_syllabus, SyllabusReading};
use crate::confidence::bound;
use crate::engine::blend;
use crate::error::PredictError;
use crate::history::{HistoryStore, Snapshot};
use crate::lms::types::{CourseFilter, CourseSummary, LmsSource};
use crate::lms::{self, with_timeout, RefreshLimits};
use crate::prediction::{letter_grade, Note, PredictionResult, Stage};
use crate::ratings::{DifficultyProfile, RatingsLookup};
use crate::strength::{estimate, punctual_strength};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("predictions_total", "Predictions served.");
        describe_counter!(
            "prediction_fallbacks_total",
            "Pipeline stages that fell back to a local default (label: stage)."
        );
        describe_histogram!("prediction_duration_ms", "End-to-end prediction latency (ms).");
    });
}

/// Body of `POST /predict`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PredictRequest {
    #[serde(default)]
    pub instructor_id: Option<String>,
    #[serde(default)]
    pub syllabus_text: Option<String>,
    #[serde(default)]
    pub target_course_id: Option<u64>,
}

/// Explanation text; `fallback` is set when it was composed locally.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Explanation {
    pub explanation: String,
    pub fallback: bool,
}

pub struct Predictor {
    lms: Arc<dyn LmsSource>,
    ai: DynAiClient,
    ratings: Arc<dyn RatingsLookup>,
    store: Arc<HistoryStore>,
    limits: RefreshLimits,
    filter: CourseFilter,
}

impl Predictor {
    pub fn new(
        lms: Arc<dyn LmsSource>,
        ai: DynAiClient,
        ratings: Arc<dyn RatingsLookup>,
        store: Arc<HistoryStore>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            lms,
            ai,
            ratings,
            store,
            limits: RefreshLimits::default(),
            filter: CourseFilter::default(),
        }
    }

    pub fn with_limits(mut self, limits: RefreshLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_filter(mut self, filter: CourseFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub async fn predict(&self, req: PredictRequest) -> Result<PredictionResult, PredictError> {
        let t0 = Instant::now();
        let history = self
            .store
            .snapshot()
            .filter(|rows| !rows.is_empty())
            .ok_or(PredictError::NoHistoricalData)?;

        let mut notes: Vec<Note> = Vec::new();

        // Target course: lateness signal, plus its syllabus when none was supplied.
        let mut lateness: Option<LatenessCount> = None;
        // Supplied text is plain; a fetched Canvas body is HTML.
        let mut syllabus = req.syllabus_text.as_deref().map(normalize_text);
        if let Some(course_id) = req.target_course_id {
            match self.target_lateness(course_id).await {
                Ok(l) => lateness = Some(l),
                Err(e) => note_fallback(
                    &mut notes,
                    Stage::TargetCourse,
                    format!("target course {course_id} submissions unavailable ({e}); assuming punctual"),
                ),
            }
            if syllabus.is_none() {
                match with_timeout("syllabus", self.limits.call_timeout, self.lms.syllabus(course_id)).await {
                    Ok(body) => syllabus = body.as_deref().map(html_to_text),
                    Err(e) => note_fallback(
                        &mut notes,
                        Stage::TargetCourse,
                        format!("target course {course_id} syllabus unavailable ({e})"),
                    ),
                }
            }
        }

        let syllabus = syllabus.filter(|s| !s.is_empty());

        let reading = match syllabus.as_deref() {
            Some(text) => read_syllabus(self.ai.as_ref(), text, self.limits.call_timeout).await,
            None => SyllabusReading::defaults(),
        };
        for n in &reading.notes {
            counter!("prediction_fallbacks_total", "stage" => n.stage.as_str()).increment(1);
        }
        notes.extend(reading.notes.iter().cloned());

        let (difficulty, instructor) = self.difficulty(req.instructor_id.as_deref(), &mut notes).await;

        let profile = estimate(&history)
            .with_punctuality(punctual_strength(lateness, reading.late_policy_strictness));
        let blended = blend(
            &profile.category_strengths,
            &reading.weights,
            difficulty.as_ref(),
            profile.punctual_strength,
            syllabus.as_deref(),
        );
        let (margin, range) = bound(blended.raw_score, difficulty.as_ref());

        let result = PredictionResult {
            category_strengths: profile.category_strengths,
            overall_strength: profile.overall_strength,
            punctual_strength: profile.punctual_strength,
            weights: reading.weights,
            weights_source: reading.weights_source,
            final_score: blended.raw_score,
            margin_of_error: margin,
            range,
            letter_grade: letter_grade(blended.raw_score),
            late_policy_strictness: reading.late_policy_strictness,
            difficulty_profile: difficulty,
            instructor,
            adjustments: blended.adjustments,
            notes,
        };

        counter!("predictions_total").increment(1);
        histogram!("prediction_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(
            courses = history.len(),
            syllabus = %syllabus.as_deref().map(fingerprint).unwrap_or_default(),
            final_score = result.final_score,
            margin = result.margin_of_error,
            notes = result.notes.len(),
            "prediction served"
        );
        Ok(result)
    }

    async fn target_lateness(&self, course_id: u64) -> anyhow::Result<LatenessCount> {
        let timeout = self.limits.call_timeout;
        let groups = with_timeout("assignment groups", timeout, self.lms.assignment_groups(course_id)).await?;
        let subs = with_timeout("submissions", timeout, self.lms.submissions(course_id)).await?;
        Ok(count_lateness(&groups, &subs))
    }

    async fn difficulty(
        &self,
        instructor_id: Option<&str>,
        notes: &mut Vec<Note>,
    ) -> (Option<DifficultyProfile>, Option<String>) {
        let Some(id) = instructor_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return (None, None);
        };
        match with_timeout(
            "ratings lookup",
            self.limits.call_timeout,
            self.ratings.instructor_profile(id),
        )
        .await
        {
            Ok(profile) => {
                tracing::debug!(instructor_id = id, provider = self.ratings.name(), "instructor profile found");
                (Some(DifficultyProfile::from(&profile)), profile.name)
            }
            Err(e) => {
                note_fallback(
                    notes,
                    Stage::Ratings,
                    format!("instructor {id} profile unavailable ({e}); no difficulty adjustment"),
                );
                (None, None)
            }
        }
    }

    /// Rebuild the whole cache. Per-course failures are embedded in the rows.
    pub async fn refresh_all(&self) -> Result<Snapshot, PredictError> {
        let rows = lms::refresh_all(Arc::clone(&self.lms), &self.filter, self.limits)
            .await
            .map_err(PredictError::Lms)?;
        let snap = self.store.replace(rows).map_err(PredictError::Cache)?;
        gauge!("history_courses").set(snap.len() as f64);
        Ok(snap)
    }

    /// Refresh one course and upsert it by `course_id`.
    pub async fn refresh_course(&self, course_id: u64) -> Result<CourseSummary, PredictError> {
        let course = with_timeout("course lookup", self.limits.call_timeout, self.lms.course(course_id))
            .await
            .map_err(PredictError::Lms)?;
        let summary = lms::summarize_or_mark(self.lms.as_ref(), &course, self.limits.call_timeout).await;
        let snap = self.store.upsert(summary.clone()).map_err(PredictError::Cache)?;
        gauge!("history_courses").set(snap.len() as f64);
        Ok(summary)
    }

    pub async fn explain(&self, req: &ExplainRequest) -> Explanation {
        match tokio::time::timeout(self.limits.call_timeout, self.ai.explain(req)).await {
            Ok(Ok(text)) => Explanation {
                explanation: text,
                fallback: false,
            },
            Ok(Err(e)) => {
                tracing::warn!(provider = self.ai.provider_name(), error = %e, "explanation unavailable; composing locally");
                local_explanation(req)
            }
            Err(_) => {
                tracing::warn!(provider = self.ai.provider_name(), "explanation timed out; composing locally");
                local_explanation(req)
            }
        }
    }
}

fn note_fallback(notes: &mut Vec<Note>, stage: Stage, message: String) {
    tracing::warn!(stage = stage.as_str(), "{message}");
    counter!("prediction_fallbacks_total", "stage" => stage.as_str()).increment(1);
    notes.push(Note::new(stage, message));
}

/// Plain explanation from the supplied factors (at most three bullets).
pub fn local_explanation(req: &ExplainRequest) -> Explanation {
    let mut text = format!(
        "The predicted grade for {} is {}, based on past performance in similar coursework and this course's grading weights.",
        req.course, req.predicted_grade
    );
    let reasons: Vec<&str> = req
        .factors
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .take(3)
        .collect();
    if reasons.is_empty() {
        text.push_str("\n- Historical category performance");
    }
    for r in reasons {
        text.push_str("\n- ");
        text.push_str(r);
    }
    Explanation {
        explanation: text,
        fallback: true,
    }
}

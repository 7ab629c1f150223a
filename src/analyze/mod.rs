// src/analyze/mod.rs
//! Syllabus analysis entry: asks the interpretation collaborator for weights and
//! late-policy strictness, validates both, and falls back locally per field.

pub mod ai_adapter;
pub mod syllabus;
pub mod weights;

use std::time::Duration;

use serde::Serialize;

use crate::analyze::ai_adapter::AiClient;
use crate::analyze::syllabus::{fingerprint, strictness_from_interpretation, truncate_for_interpretation};
use crate::analyze::weights::{weights_from_interpretation, WeightSet};
use crate::prediction::{Note, Stage, WeightsSource};
use crate::strength::DEFAULT_STRICTNESS;

// Re-export convenient types.
pub use crate::analyze::ai_adapter::{DynAiClient, ExplainRequest};
pub use crate::analyze::weights::FALLBACK_WEIGHTS;

/// Resolved syllabus signals plus the notes for any stage that fell back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllabusReading {
    pub weights: WeightSet,
    pub weights_source: WeightsSource,
    pub late_policy_strictness: f64,
    pub notes: Vec<Note>,
}

impl SyllabusReading {
    /// Nothing to interpret: documented defaults, no notes.
    pub fn defaults() -> Self {
        Self {
            weights: WeightSet::fallback(),
            weights_source: WeightsSource::Fallback,
            late_policy_strictness: DEFAULT_STRICTNESS,
            notes: Vec::new(),
        }
    }

    fn fall_back(stage: Stage, message: String) -> Self {
        let mut out = Self::defaults();
        out.notes.push(Note::new(stage, message));
        out
    }
}

/// Interpret `text` (already normalized). Empty text never reaches the collaborator;
/// long text is cut to `MAX_SYLLABUS_CHARS` before it is sent.
pub async fn read_syllabus(client: &dyn AiClient, text: &str, timeout: Duration) -> SyllabusReading {
    if text.trim().is_empty() {
        return SyllabusReading::defaults();
    }
    let fp = fingerprint(text);
    let sent = truncate_for_interpretation(text);

    let value = match tokio::time::timeout(timeout, client.interpret_syllabus(sent)).await {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            tracing::warn!(syllabus = %fp, provider = client.provider_name(), error = %e, "syllabus interpretation failed; fallback weights");
            return SyllabusReading::fall_back(
                Stage::Syllabus,
                format!("syllabus interpretation unavailable ({e}); using default weights"),
            );
        }
        Err(_) => {
            tracing::warn!(syllabus = %fp, timeout_ms = timeout.as_millis() as u64, "syllabus interpretation timed out");
            return SyllabusReading::fall_back(
                Stage::Syllabus,
                format!(
                    "syllabus interpretation timed out after {}ms; using default weights",
                    timeout.as_millis()
                ),
            );
        }
    };

    let mut out = SyllabusReading::defaults();

    match weights_from_interpretation(&value) {
        Ok(w) => {
            out.weights = w;
            out.weights_source = WeightsSource::Syllabus;
        }
        Err(rejection) => {
            tracing::warn!(syllabus = %fp, %rejection, "syllabus weights rejected");
            out.notes.push(Note::new(
                Stage::Weights,
                format!("syllabus weights rejected ({rejection}); using default weights"),
            ));
        }
    }

    match strictness_from_interpretation(&value) {
        Some(s) => out.late_policy_strictness = s,
        None => {
            tracing::debug!(syllabus = %fp, "late-policy strictness missing or out of range");
            out.notes.push(Note::new(
                Stage::Strictness,
                format!("late-policy strictness unavailable; assuming {DEFAULT_STRICTNESS}"),
            ));
        }
    }

    tracing::info!(
        syllabus = %fp,
        source = ?out.weights_source,
        strictness = out.late_policy_strictness,
        "syllabus interpreted"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{CachingClient, DisabledClient, FailingProvider, MockProvider};
    use crate::category::Category;

    fn client_with(reply: &str) -> (CachingClient<MockProvider>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider {
            syllabus_reply: reply.to_string(),
            ..MockProvider::default()
        };
        (CachingClient::new(provider, dir.path().to_path_buf(), 10), dir)
    }

    #[tokio::test]
    async fn empty_text_skips_collaborator() {
        let r = read_syllabus(&DisabledClient, "   ", Duration::from_secs(1)).await;
        assert_eq!(r, SyllabusReading::defaults());
    }

    #[tokio::test]
    async fn valid_reply_is_normalized() {
        let (c, _d) = client_with(
            r#"{"weights":{"projects":20,"assignments":20,"exams":50,"participation":10},"late_policy_strictness":8}"#,
        );
        let r = read_syllabus(&c, "Exams 50%", Duration::from_secs(1)).await;
        assert_eq!(r.weights_source, WeightsSource::Syllabus);
        assert!((r.weights.get(Category::Exams) - 50.0).abs() < 1e-9);
        assert_eq!(r.late_policy_strictness, 8.0);
        assert!(r.notes.is_empty());
    }

    #[tokio::test]
    async fn negative_weight_discards_all_but_keeps_strictness() {
        let (c, _d) = client_with(
            r#"{"weights":{"projects":-5,"assignments":40,"exams":35,"participation":5},"late_policy_strictness":9}"#,
        );
        let r = read_syllabus(&c, "Projects -5%", Duration::from_secs(1)).await;
        assert_eq!(r.weights, WeightSet::fallback());
        assert_eq!(r.weights_source, WeightsSource::Fallback);
        assert_eq!(r.late_policy_strictness, 9.0);
        assert_eq!(r.notes.len(), 1);
        assert_eq!(r.notes[0].stage, Stage::Weights);
    }

    #[tokio::test]
    async fn out_of_range_strictness_defaults() {
        let (c, _d) = client_with(
            r#"{"weights":{"projects":25,"assignments":25,"exams":25,"participation":25},"late_policy_strictness":42}"#,
        );
        let r = read_syllabus(&c, "Everything 25%", Duration::from_secs(1)).await;
        assert_eq!(r.weights_source, WeightsSource::Syllabus);
        assert_eq!(r.late_policy_strictness, DEFAULT_STRICTNESS);
        assert_eq!(r.notes[0].stage, Stage::Strictness);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_with_note() {
        let dir = tempfile::tempdir().unwrap();
        let c = CachingClient::new(FailingProvider, dir.path().to_path_buf(), 10);
        let r = read_syllabus(&c, "Some syllabus", Duration::from_secs(1)).await;
        assert_eq!(r.weights, WeightSet::fallback());
        assert_eq!(r.notes.len(), 1);
        assert_eq!(r.notes[0].stage, Stage::Syllabus);
        assert!(r.notes[0].message.contains("simulated failure"));
    }
}

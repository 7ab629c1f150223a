//! Ratings lookup collaborator: instructor difficulty profile.
//!
//! The production lookup talks to the RateMyProfessors GraphQL endpoint. Every
//! numeric field is independently nullable; values are passed through as reported.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RATINGS_ENDPOINT: &str = "https://www.ratemyprofessors.com/graphql";

/// Instructor profile as returned by the lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstructorProfile {
    pub name: Option<String>,
    pub avg_rating: Option<f64>,
    pub avg_difficulty: Option<f64>,
    pub num_ratings: Option<u32>,
    pub would_take_again_percent: Option<f64>,
}

/// The subset of an instructor profile the engine consumes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DifficultyProfile {
    pub avg_rating: Option<f64>,
    pub avg_difficulty: Option<f64>,
    pub would_take_again_percent: Option<f64>,
}

impl From<&InstructorProfile> for DifficultyProfile {
    fn from(p: &InstructorProfile) -> Self {
        Self {
            avg_rating: p.avg_rating,
            avg_difficulty: p.avg_difficulty,
            would_take_again_percent: p.would_take_again_percent,
        }
    }
}

#[async_trait::async_trait]
pub trait RatingsLookup: Send + Sync {
    async fn instructor_profile(&self, instructor_id: &str) -> Result<InstructorProfile>;
    fn name(&self) -> &'static str;
}

/// Lookup used when ratings are disabled in config; every call fails.
pub struct DisabledRatings;

#[async_trait::async_trait]
impl RatingsLookup for DisabledRatings {
    async fn instructor_profile(&self, _instructor_id: &str) -> Result<InstructorProfile> {
        Err(anyhow!("ratings lookup disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

pub struct RateMyProfessorsClient {
    http: reqwest::Client,
    endpoint: String,
}

const INSTRUCTOR_QUERY: &str = "query TeacherRatings($id: ID!) { node(id: $id) { ... on Teacher { \
firstName lastName avgRating avgDifficulty numRatings wouldTakeAgainPercent } } }";

/// RMP's public web client credentials (not a secret).
const RMP_BASIC_AUTH: &str = "Basic dGVzdDp0ZXN0";

impl RateMyProfessorsClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("grade-predictor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building ratings http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Accept either a numeric legacy id or an already-encoded GraphQL node id.
    fn node_id(instructor_id: &str) -> String {
        let id = instructor_id.trim();
        if id.chars().all(|c| c.is_ascii_digit()) {
            base64::engine::general_purpose::STANDARD.encode(format!("Teacher-{id}"))
        } else {
            id.to_string()
        }
    }
}

#[derive(Deserialize)]
struct GqlResp {
    data: Option<GqlData>,
}
#[derive(Deserialize)]
struct GqlData {
    node: Option<GqlInstructor>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlInstructor {
    first_name: Option<String>,
    last_name: Option<String>,
    avg_rating: Option<f64>,
    avg_difficulty: Option<f64>,
    num_ratings: Option<u32>,
    would_take_again_percent: Option<f64>,
}

#[async_trait::async_trait]
impl RatingsLookup for RateMyProfessorsClient {
    async fn instructor_profile(&self, instructor_id: &str) -> Result<InstructorProfile> {
        let body = serde_json::json!({
            "query": INSTRUCTOR_QUERY,
            "variables": { "id": Self::node_id(instructor_id) },
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, RMP_BASIC_AUTH)
            .json(&body)
            .send()
            .await
            .context("ratings request failed")?
            .error_for_status()
            .context("ratings request rejected")?;
        let parsed: GqlResp = resp.json().await.context("parsing ratings response")?;
        let t = parsed
            .data
            .and_then(|d| d.node)
            .ok_or_else(|| anyhow!("instructor {instructor_id} not found"))?;

        let name = match (t.first_name, t.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (f, l) => f.or(l),
        };
        Ok(InstructorProfile {
            name,
            avg_rating: t.avg_rating,
            avg_difficulty: t.avg_difficulty,
            num_ratings: t.num_ratings,
            would_take_again_percent: t.would_take_again_percent,
        })
    }
    fn name(&self) -> &'static str {
        "ratemyprofessors"
    }
}

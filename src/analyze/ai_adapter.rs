//! AI adapter: text-interpretation collaborator behind a provider abstraction,
//! with a file cache and a daily cap on real provider calls.
//!
//! Two tasks are supported: turning syllabus text into a structured weights object,
//! and writing a short natural-language explanation of a prediction. Output of the
//! syllabus task is returned as raw JSON; callers validate it field by field.

use std::fs;
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ai::AiConfig;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("interpretation disabled")]
    Disabled,
    #[error("daily limit reached")]
    DailyLimit,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed output: {0}")]
    Malformed(String),
}

/// Inputs for a prediction explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplainRequest {
    pub course: String,
    pub predicted_grade: String,
    #[serde(default)]
    pub factors: Vec<String>,
}

/// Trait object used by the orchestrator and handlers.
pub trait AiClient: Send + Sync {
    /// Interpret syllabus text into `{"weights": {...}, "late_policy_strictness": n}`.
    fn interpret_syllabus<'a>(&'a self, syllabus: &'a str) -> BoxFuture<'a, Result<Value, AiError>>;
    /// Short explanation (2-3 sentences + bullet reasons).
    fn explain<'a>(&'a self, req: &'a ExplainRequest) -> BoxFuture<'a, Result<String, AiError>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * If `AI_TEST_MODE=error`, returns a client whose provider always fails.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider (OpenAI) wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    let cache_dir = PathBuf::from(&config.cache_dir);
    match std::env::var("AI_TEST_MODE").as_deref() {
        Ok("mock") => {
            return Arc::new(CachingClient::new(
                MockProvider::default(),
                cache_dir,
                config.daily_limit,
            ))
        }
        Ok("error") => return Arc::new(CachingClient::new(FailingProvider, cache_dir, u32::MAX)),
        _ => {}
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(config) {
            Ok(provider) => Arc::new(CachingClient::new(provider, cache_dir, config.daily_limit)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build OpenAI client; interpretation disabled");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown AI provider; interpretation disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Prompts
// ------------------------------------------------------------

const SYLLABUS_SYSTEM: &str = "You extract grading policy from course syllabi. \
Return ONLY a JSON object of the form \
{\"weights\": {\"projects\": number, \"assignments\": number, \"exams\": number, \"participation\": number}, \
\"late_policy_strictness\": number}. \
Map every graded component onto exactly one of the four categories: exams (exams, midterms, finals, quizzes, tests), \
projects (projects, capstones, labs), participation (participation, attendance, discussion, polls, peer review), \
assignments (everything else). Weights are percentages of the final grade. \
late_policy_strictness is 1 (late work always accepted) to 10 (late work never accepted); use 5 for flexible extensions. \
If the syllabus does not state weights, return {\"weights\": {\"projects\": 25, \"assignments\": 35, \"exams\": 35, \"participation\": 5}, \"late_policy_strictness\": 5}.";

const EXPLAIN_SYSTEM: &str = "You explain predicted course grades to students. \
Write a short explanation (2-3 sentences) followed by a bulleted list of the 3 main reasons. \
Neutral, encouraging tone, no emojis.";

fn explain_prompt(req: &ExplainRequest) -> String {
    format!(
        "A student is considering {}. Their predicted grade is {}. Factors influencing this: {}.",
        req.course,
        req.predicted_grade,
        req.factors.join(", ")
    )
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Syllabus,
    Explain,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            TaskKind::Syllabus => "syllabus",
            TaskKind::Explain => "explain",
        }
    }
}

/// Low-level provider: does a *real* remote call and returns the raw completion text.
/// Separated so the same caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        kind: TaskKind,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, AiError>>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let api_key = if config.api_key.is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            config.api_key.clone()
        };
        let http = reqwest::Client::builder()
            .user_agent("grade-predictor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
        })
    }
}

impl Provider for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        kind: TaskKind,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(AiError::Provider("missing API key".into()));
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct ResponseFormat {
                #[serde(rename = "type")]
                kind: &'static str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
                #[serde(skip_serializing_if = "Option::is_none")]
                response_format: Option<ResponseFormat>,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: Option<String>,
            }

            let (max_tokens, response_format) = match kind {
                TaskKind::Syllabus => (200, Some(ResponseFormat { kind: "json_object" })),
                TaskKind::Explain => (250, None),
            };
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: 0.0,
                max_tokens,
                response_format,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| AiError::Provider(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(AiError::Provider(format!("HTTP {}", resp.status())));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| AiError::Malformed(e.to_string()))?;
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| AiError::Malformed("empty completion".into()))
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; used when AI is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn interpret_syllabus<'a>(&'a self, _syllabus: &'a str) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async { Err(AiError::Disabled) })
    }
    fn explain<'a>(&'a self, _req: &'a ExplainRequest) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(async { Err(AiError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub syllabus_reply: String,
    pub explain_reply: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            syllabus_reply: r#"{"weights":{"projects":30,"assignments":30,"exams":35,"participation":5},"late_policy_strictness":5}"#
                .to_string(),
            explain_reply: "Predicted grade reflects historical performance (mock).\n- Strong history\n- Typical weighting\n- Average difficulty".to_string(),
        }
    }
}

impl Provider for MockProvider {
    fn complete<'a>(
        &'a self,
        kind: TaskKind,
        _system: &'a str,
        _user: &'a str,
    ) -> BoxFuture<'a, Result<String, AiError>> {
        let out = match kind {
            TaskKind::Syllabus => self.syllabus_reply.clone(),
            TaskKind::Explain => self.explain_reply.clone(),
        };
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Provider that always errors (`AI_TEST_MODE=error`).
pub struct FailingProvider;

impl Provider for FailingProvider {
    fn complete<'a>(
        &'a self,
        _kind: TaskKind,
        _system: &'a str,
        _user: &'a str,
    ) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(async { Err(AiError::Provider("simulated failure".into())) })
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Counter state is guarded by a `Mutex`; cache files are written via tmp + rename.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    fn counter(&self) -> std::sync::MutexGuard<'_, DailyCounter> {
        match self.counter.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Claim one call against today's cap; `false` once the cap is reached.
    fn try_reserve_call(&self) -> bool {
        let mut g = self.counter();
        if g.is_expired() {
            g.reset_to_today();
        }
        if g.count >= self.daily_limit_max {
            return false;
        }
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        true
    }

    /// Return a claim whose provider call failed.
    fn release_call(&self) {
        let mut g = self.counter();
        g.count = g.count.saturating_sub(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
    }

    async fn complete_cached(
        &self,
        kind: TaskKind,
        system: &str,
        user: &str,
        accept: impl Fn(&str) -> Result<(), AiError>,
    ) -> Result<String, AiError> {
        let key = cache_key(kind, user);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            tracing::debug!(kind = kind.as_str(), "ai cache hit");
            return Ok(hit.content);
        }

        // Cache hits do not count against the daily limit.
        if !self.try_reserve_call() {
            return Err(AiError::DailyLimit);
        }

        let fresh = match self.inner.complete(kind, system, user).await {
            Ok(s) => s,
            Err(e) => {
                self.release_call();
                return Err(e);
            }
        };
        accept(&fresh)?;
        let _ = write_cache_file(
            &self.cache_dir,
            &key,
            &CachedReply {
                content: fresh.clone(),
            },
        );
        Ok(fresh)
    }

    async fn interpret_impl(&self, syllabus: &str) -> Result<Value, AiError> {
        let raw = self
            .complete_cached(TaskKind::Syllabus, SYLLABUS_SYSTEM, syllabus, |s| {
                parse_json_object(s).map(|_| ())
            })
            .await?;
        parse_json_object(&raw)
    }

    async fn explain_impl(&self, req: &ExplainRequest) -> Result<String, AiError> {
        let prompt = explain_prompt(req);
        let raw = self
            .complete_cached(TaskKind::Explain, EXPLAIN_SYSTEM, &prompt, |s| {
                if sanitize_explanation(s).is_empty() {
                    Err(AiError::Malformed("empty explanation".into()))
                } else {
                    Ok(())
                }
            })
            .await?;
        Ok(sanitize_explanation(&raw))
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn interpret_syllabus<'a>(&'a self, syllabus: &'a str) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(self.interpret_impl(syllabus))
    }
    fn explain<'a>(&'a self, req: &'a ExplainRequest) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(self.explain_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Parse a completion as a JSON object, tolerating a fenced ```json block around it.
pub fn parse_json_object(raw: &str) -> Result<Value, AiError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    let v: Value = serde_json::from_str(body).map_err(|e| AiError::Malformed(e.to_string()))?;
    if v.is_object() {
        Ok(v)
    } else {
        Err(AiError::Malformed("expected a JSON object".into()))
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedReply {
    content: String,
}

fn cache_key(kind: TaskKind, input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(12).map(|b| format!("{:02x}", b)).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedReply> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedReply) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let p = counter_path(dir);
    let s = fs::read_to_string(p)?;
    let dc: DailyCounter =
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(dc)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// ASCII-only, at most 1200 chars; keeps line breaks, collapses other whitespace.
pub fn sanitize_explanation(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(1200));
    for line in input.lines() {
        let mut cleaned = String::new();
        let mut prev_space = false;
        for ch in line.chars() {
            let c = if ch.is_ascii() && !ch.is_ascii_control() { ch } else { ' ' };
            if c == ' ' {
                if !prev_space && !cleaned.is_empty() {
                    cleaned.push(' ');
                }
                prev_space = true;
            } else {
                cleaned.push(c);
                prev_space = false;
            }
        }
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(cleaned);
        if out.len() >= 1200 {
            out.truncate(1200);
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_client<P: Provider>(p: P, limit: u32) -> (CachingClient<P>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (CachingClient::new(p, dir.path().to_path_buf(), limit), dir)
    }

    #[tokio::test]
    async fn mock_interpretation_is_a_json_object() {
        let (client, _dir) = tmp_client(MockProvider::default(), 5);
        let v = client.interpret_syllabus("Exams 35%").await.unwrap();
        assert_eq!(v["weights"]["exams"], 35);
        assert_eq!(client.provider_name(), "mock");
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_and_not_cached() {
        let provider = MockProvider {
            syllabus_reply: "weights: lots".into(),
            ..MockProvider::default()
        };
        let (client, dir) = tmp_client(provider, 5);
        let err = client.interpret_syllabus("x").await.unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
        let cached = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name() != "daily_count.json")
            .count();
        assert_eq!(cached, 0);
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls_but_not_cache_hits() {
        let (client, _dir) = tmp_client(MockProvider::default(), 1);
        assert!(client.interpret_syllabus("first").await.is_ok());
        // cached: still served
        assert!(client.interpret_syllabus("first").await.is_ok());
        assert_eq!(
            client.interpret_syllabus("second").await.unwrap_err(),
            AiError::DailyLimit
        );
    }

    struct CountingProvider {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Provider for CountingProvider {
        fn complete<'a>(
            &'a self,
            _kind: TaskKind,
            _system: &'a str,
            _user: &'a str,
        ) -> BoxFuture<'a, Result<String, AiError>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(r#"{"weights":{}}"#.to_string())
            })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_respect_daily_limit() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (client, _dir) = tmp_client(
            CountingProvider {
                calls: Arc::clone(&calls),
            },
            2,
        );
        let client = Arc::new(client);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let client = Arc::clone(&client);
            tasks.spawn(async move { client.interpret_syllabus(&format!("syllabus {i}")).await });
        }
        let mut ok = 0;
        while let Some(r) = tasks.join_next().await {
            match r.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e, AiError::DailyLimit),
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_provider_calls_do_not_use_up_the_limit() {
        let (client, _dir) = tmp_client(FailingProvider, 1);
        for _ in 0..3 {
            let err = client.interpret_syllabus("x").await.unwrap_err();
            assert!(matches!(err, AiError::Provider(_)));
        }
    }

    #[tokio::test]
    async fn disabled_client_fails() {
        let c = DisabledClient;
        assert_eq!(c.interpret_syllabus("x").await.unwrap_err(), AiError::Disabled);
    }

    #[serial_test::serial]
    #[test]
    fn test_mode_env_selects_client() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AiConfig {
            cache_dir: dir.path().display().to_string(),
            ..AiConfig::default()
        };
        std::env::set_var("AI_TEST_MODE", "mock");
        let mock = build_client_from_config(&cfg);
        std::env::set_var("AI_TEST_MODE", "error");
        let failing = build_client_from_config(&cfg);
        std::env::remove_var("AI_TEST_MODE");

        assert_eq!(mock.provider_name(), "mock");
        assert_eq!(failing.provider_name(), "failing");
        assert_eq!(build_client_from_config(&cfg).provider_name(), "disabled");
    }

    #[test]
    fn parses_fenced_json() {
        let v = parse_json_object("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v["a"], 1);
        assert!(parse_json_object("[1,2]").is_err());
    }

    #[test]
    fn sanitize_keeps_lines_and_drops_non_ascii() {
        let s = sanitize_explanation("  Good  work \u{1F600}\n\n- reason   one\n");
        assert_eq!(s, "Good work\n- reason one");
    }
}

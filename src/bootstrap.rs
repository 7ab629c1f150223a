// src/bootstrap.rs
//! Process wiring shared by the Shuttle entrypoint and the standalone server:
//! tracing, collaborators built from config, router assembly.

use std::sync::Arc;

use anyhow::Context;
use metrics::gauge;
use shuttle_axum::axum::Router;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::analyze::ai_adapter::build_client_from_config;
use crate::api::{router, AppState};
use crate::config::ai::AiConfig;
use crate::config::AppConfig;
use crate::history::HistoryStore;
use crate::lms::providers::canvas::CanvasClient;
use crate::metrics::Metrics;
use crate::orchestrator::Predictor;
use crate::ratings::{DisabledRatings, RateMyProfessorsClient, RatingsLookup};

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A no-op if one is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("grade_predictor=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Startup sequence for both binaries: `.env`, then tracing, then the config files,
/// so diagnostics from config loading reach the subscriber.
pub fn load_settings() -> anyhow::Result<(AppConfig, AiConfig)> {
    load_settings_with(init_tracing)
}

fn load_settings_with(install_tracing: impl FnOnce()) -> anyhow::Result<(AppConfig, AiConfig)> {
    let _ = dotenvy::dotenv();
    install_tracing();
    let cfg = AppConfig::load()?;
    Ok((cfg, AiConfig::load_or_default()))
}

pub fn build_predictor(cfg: &AppConfig, ai_cfg: &AiConfig) -> anyhow::Result<Predictor> {
    let timeout = cfg.limits.call_timeout();

    if cfg.canvas.base_url.is_empty() || cfg.canvas.api_token.is_empty() {
        warn!("canvas base_url or api_token not configured; refresh will fail");
    }
    let lms = CanvasClient::new(
        cfg.canvas.base_url.clone(),
        cfg.canvas.api_token.clone(),
        cfg.canvas.per_page,
        timeout,
    )?;

    // Safe diagnostics: only provider + enabled + key length
    info!(
        provider = %ai_cfg.provider,
        enabled = ai_cfg.enabled,
        key_len = ai_cfg.api_key.len(),
        "AI config loaded"
    );
    let ai = build_client_from_config(ai_cfg);

    let ratings: Arc<dyn RatingsLookup> = if cfg.ratings.enabled {
        Arc::new(RateMyProfessorsClient::new(cfg.ratings.endpoint.clone(), timeout)?)
    } else {
        Arc::new(DisabledRatings)
    };

    let store = HistoryStore::open(&cfg.cache.path)
        .with_context(|| format!("opening course cache {}", cfg.cache.path.display()))?;
    info!(
        path = %cfg.cache.path.display(),
        courses = store.snapshot().map(|s| s.len()).unwrap_or(0),
        "course cache opened"
    );

    Ok(Predictor::new(Arc::new(lms), ai, ratings, Arc::new(store))
        .with_limits(cfg.limits.refresh_limits())
        .with_filter(cfg.canvas.course_filter()))
}

/// Full application router, with `/metrics` when the recorder could be installed.
pub fn build_app(cfg: &AppConfig, ai_cfg: &AiConfig) -> anyhow::Result<Router> {
    // Recorder first so metric descriptions registered during wiring are kept.
    let exporter = match Metrics::init(0) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let predictor = build_predictor(cfg, ai_cfg)?;
    let cached = predictor.store().snapshot().map(|s| s.len()).unwrap_or(0);
    gauge!("history_courses").set(cached as f64);

    let app = router(AppState::new(predictor));
    Ok(match exporter {
        Some(m) => app.merge(m.router()),
        None => app,
    })
}

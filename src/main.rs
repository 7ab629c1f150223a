//! Grade Predictor: Shuttle entrypoint.
//! Boots the Axum HTTP server with the prediction, refresh and explain routes.
//!
//! See `README.md` for configuration and `src/bin/serve.rs` for running without Shuttle.

use grade_predictor::bootstrap::{build_app, load_settings};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    let (cfg, ai_cfg) = load_settings()?;
    let router = build_app(&cfg, &ai_cfg)?;

    Ok(router.into())
}

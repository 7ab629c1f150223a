//! Standalone server (no Shuttle): binds `[server] host:port` from the config.

use grade_predictor::bootstrap::{build_app, load_settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, ai_cfg) = load_settings()?;
    let app = build_app(&cfg, &ai_cfg)?;

    let addr = cfg.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "grade predictor listening");
    axum::serve(listener, app).await?;
    Ok(())
}

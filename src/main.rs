use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use design_pipeline::config::Config;
use design_pipeline::gemini::GeminiClient;
use design_pipeline::pipeline::{PipelineOrchestrator, PipelineSettings};
use design_pipeline::routes::{router, AppState};
use design_pipeline::variants::VariantRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    match &config.api_key {
        Some(key) => {
            let preview: String = key.chars().take(6).collect();
            tracing::info!("Using API key: {}...", preview);
        }
        None => tracing::warn!("GEMINI_API_KEY not set; running in demo mode"),
    }

    let gemini = Arc::new(GeminiClient::new(&config));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        gemini.clone(),
        gemini,
        PipelineSettings { remote_timeout: config.remote_timeout },
    ));
    let state = AppState {
        variants: Arc::new(VariantRunner::new(orchestrator.clone(), config.variant_concurrency)),
        orchestrator,
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

//! Focus Tracker - Main Entry Point

use std::sync::Arc;

use alerting::LogSink;
use anyhow::Context;
use api::{init_logging, run_server, AppState, Settings};
use camera_capture::JpegEncoder;
use focus_engine::{MockAdapter, SignalAdapter};
use metrics_exporter_prometheus::PrometheusBuilder;
use session::{AdapterFactory, SessionError, SessionWorker};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(&settings.logging).context("failed to initialise logging")?;

    info!("=== Focus Tracker v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    warn!("No detection backend configured, using the mock signal adapter");
    let adapters: AdapterFactory =
        Arc::new(|| Box::new(MockAdapter::new()) as Box<dyn SignalAdapter>);
    let worker = SessionWorker::new(
        settings.session.clone(),
        settings.engine.clone(),
        Arc::new(settings.camera.clone()),
        adapters,
    )
    .with_encoder(JpegEncoder::new(settings.camera.jpeg_quality))
    .with_alerts(settings.alerts.clone(), Arc::new(LogSink));

    let state = Arc::new(AppState::new(worker).with_metrics(metrics));
    let addr = settings.server.addr();

    run_server(Arc::clone(&state), &addr, shutdown_signal(Arc::clone(&state)))
        .await
        .with_context(|| format!("server on {} failed", addr))?;

    info!("Focus tracker stopped");
    Ok(())
}

/// Resolve on Ctrl-C after stopping any running session
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");

    match state.worker.stop().await {
        Ok(()) => info!("Stopped running session"),
        Err(SessionError::NotRunning) => {}
        Err(e) => warn!("Failed to stop session: {}", e),
    }
}

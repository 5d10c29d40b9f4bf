//! BoxBox Server
//!
//! Listens for game telemetry, evaluates race-engineer triggers and speaks
//! the resulting advisories. Also serves a small control API.

use anyhow::Result;
use boxbox_core::TriggerEngine;
use boxbox_server::audio::AudioQueue;
use boxbox_server::config::Config;
use boxbox_server::pipeline::{self, Collaborators, Evaluator, PipelineConfig, Watchdog};
use boxbox_server::recorder::NdjsonLapRecorder;
use boxbox_server::voice::{ConsoleOutput, FallbackGenerator, TextOnlySynthesizer};
use boxbox_server::{api, state};
use boxbox_telemetry::{demo, listener, PacketDecoder};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting BoxBox");

    let config = Config::from_env()?;
    let timings = PipelineConfig::from(&config);
    let shutdown = CancellationToken::new();

    // Audio delivery
    let audio = AudioQueue::new(config.queue_config(), Arc::new(ConsoleOutput::new()));
    tokio::spawn(audio.clone().run(shutdown.clone()));

    // Create application state
    let state = state::AppState::new(audio.clone());

    // Telemetry ingestion
    let (signal_tx, signal_rx) = mpsc::channel(16);
    let socket = listener::bind(config.udp_addr()).await?;
    let decoder = PacketDecoder::new(config.session_numbering, config.player_accounts.clone());
    tokio::spawn(listener::run(
        socket,
        state.store.clone(),
        decoder,
        signal_tx,
        shutdown.clone(),
    ));

    // Evaluation, watchdog and dispatch
    let (dispatch_tx, dispatch_rx) = mpsc::channel(pipeline::DISPATCH_CAPACITY);
    let recorder = Arc::new(NdjsonLapRecorder::new(config.lap_log_path()));
    info!("Recording laps to {}", recorder.path().display());
    tokio::spawn(pipeline::run_evaluation(
        state.clone(),
        Evaluator::new(TriggerEngine::new(config.engine_config())),
        signal_rx,
        dispatch_tx,
        recorder,
        timings.tick_interval,
        shutdown.clone(),
    ));
    tokio::spawn(pipeline::run_watchdog(
        state.clone(),
        Watchdog::new(timings.telemetry_timeout, timings.telemetry_lost_cooldown),
        timings.watchdog_interval,
        shutdown.clone(),
    ));
    let collaborators = Collaborators {
        text: Arc::new(FallbackGenerator),
        speech: Arc::new(TextOnlySynthesizer::new()),
    };
    tokio::spawn(pipeline::run_dispatcher(
        dispatch_rx,
        collaborators,
        audio,
        timings.generation_timeout,
        shutdown.clone(),
    ));

    if config.demo {
        let target = config.demo_target();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = demo::run(target, token).await {
                error!("Demo feed stopped: {}", e);
            }
        });
    }

    // Build the router
    let app = api::create_router(state);

    // Start server
    let addr = config.http_addr();
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    Ok(())
}

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use trawler::cycle::{CycleOrchestrator, LogStatusHook};
use trawler::queue::SqliteWorkQueue;
use trawler::sink::HttpIntakeSink;
use trawler::store::SqliteStateStore;
use trawler::{build_streams, load_definitions, CollectorConfig, DedupGuard};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trawler=info".into()),
        )
        .init();

    info!("Trawler collector starting...");

    // Read configuration from environment
    let db_path = std::env::var("TRAWLER_DB").unwrap_or_else(|_| "trawler.db".to_string());

    let sources_path =
        std::env::var("TRAWLER_SOURCES").context("TRAWLER_SOURCES is required (path to stream definitions JSON)")?;

    let intake_url = std::env::var("TRAWLER_INTAKE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let intake_token = std::env::var("TRAWLER_INTAKE_TOKEN").ok();

    let config = CollectorConfig::from_env();

    info!(
        db_path = %db_path,
        sources_path = %sources_path,
        intake_url = %intake_url,
        max_pages = config.max_pages,
        "Configuration loaded"
    );

    // Load stream definitions and build the adapter table
    let definitions = load_definitions(&sources_path)?;
    if definitions.is_empty() {
        warn!("No stream definitions found, nothing to collect");
    }
    let streams = build_streams(definitions);
    info!(stream_count = streams.len(), "Streams registered");

    // Durable infrastructure shares one database file
    let state_store = Arc::new(
        SqliteStateStore::new(&db_path).context("Failed to initialize state store")?,
    );
    let work_queue =
        Arc::new(SqliteWorkQueue::new(&db_path).context("Failed to initialize work queue")?);

    let sink = Arc::new(HttpIntakeSink::new(intake_url, intake_token));
    let guard = DedupGuard::new(state_store, config.liveness_threshold_secs);
    let liveness_secs = config.liveness_threshold_secs;

    let orchestrator = Arc::new(CycleOrchestrator::new(
        streams,
        guard,
        Arc::clone(&work_queue) as Arc<dyn trawler::WorkQueue>,
        sink,
        Arc::new(LogStatusHook),
        config,
    ));

    // Seed streams that have no scheduled work yet (restart-safe)
    let mut seeded = 0;
    for stream_id in orchestrator.stream_ids() {
        if !work_queue.has_pending(&stream_id)? {
            orchestrator.initialize(&stream_id).await?;
            seeded += 1;
        }
    }
    info!(seeded = seeded, "Initial work items seeded");

    // Worker loop: claim due work every second, run cycles, ack on success
    let worker_queue = Arc::clone(&work_queue);
    let worker_orchestrator = Arc::clone(&orchestrator);
    let worker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;

            let claimed = match worker_queue.dequeue_due(chrono::Utc::now(), liveness_secs) {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "Failed to claim due work");
                    continue;
                }
            };

            for message in claimed {
                let stream_id = message.item.state.stream_id.clone();
                match worker_orchestrator.run_cycle(message.item).await {
                    Ok(report) => {
                        info!(stream_id = %stream_id, ?report, "Cycle handled");
                        if let Err(e) = worker_queue.ack(message.message_id) {
                            error!(stream_id = %stream_id, error = %e, "Failed to ack message");
                        }
                    }
                    Err(e) => {
                        // Leave unacked — redelivered after the visibility window
                        warn!(
                            stream_id = %stream_id,
                            receive_count = message.receive_count,
                            error = %e,
                            "Cycle failed, awaiting redelivery"
                        );
                    }
                }
            }
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    worker.abort();
    info!("Trawler collector stopped");

    Ok(())
}

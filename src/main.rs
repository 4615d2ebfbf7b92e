//! MineWatch agent entrypoint: loads readings, scores each mine, dispatches alerts.
//! Runs a single cycle or a daemon loop with configurable interval. One NDJSON
//! report line per mine goes to stdout; logs go to stderr.

use minewatch_agent::{
    alert::AlertDispatcher,
    config::AgentConfig,
    features::{load_readings, FeatureStore},
    logging::{ReportLine, StructuredLogger},
    pipeline::MonitorPipeline,
    storage::{EventSink, NullSink, SecureStore},
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

static STOP: AtomicBool = AtomicBool::new(false);

fn open_sink(config: &AgentConfig) -> Result<Arc<dyn EventSink>, BoxError> {
    if !config.store.enabled {
        return Ok(Arc::new(NullSink));
    }
    std::fs::create_dir_all(&config.data_dir)?;
    let secret = std::env::var("MINEWATCH_STORE_SECRET").unwrap_or_else(|_| {
        warn!("MINEWATCH_STORE_SECRET not set; using a placeholder store key");
        "minewatch-device-secret-placeholder".to_string()
    });
    let store = SecureStore::open(&config.store_path(), secret.as_bytes())?;
    if config.store.retention_days > 0 {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(config.store.retention_days));
        let pruned = store.prune_before(cutoff)?;
        if pruned > 0 {
            info!(pruned, "old store rows pruned");
        }
    }
    Ok(Arc::new(store))
}

async fn run_one_cycle(
    pipeline: &mut MonitorPipeline,
    store: &mut FeatureStore,
    readings_path: &std::path::Path,
) -> Result<(), BoxError> {
    let parsed = load_readings(readings_path, Utc::now())?;
    let added = store.extend(parsed.readings);
    info!(added, mines = store.latest_per_mine().len(), "readings ingested");

    let reports = pipeline.run_cycle(store).await;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        StructuredLogger::emit_json(&ReportLine::from_report(report), &mut out);
    }
    Ok(())
}

async fn run(config: AgentConfig, readings_path: PathBuf) -> Result<(), BoxError> {
    let sink = open_sink(&config)?;
    let dispatcher = AlertDispatcher::from_config(&config.alerts, &config.data_dir, sink.clone())?;
    info!(
        backends = ?dispatcher.backend_names(),
        policy = ?dispatcher.policy(),
        "alert dispatcher ready"
    );
    let interval_secs = config.interval_secs;
    let mut pipeline = MonitorPipeline::new(config, dispatcher, sink);
    let mut store = FeatureStore::new();

    if interval_secs == 0 {
        run_one_cycle(&mut pipeline, &mut store, &readings_path).await?;
        info!("MineWatch cycle complete");
        return Ok(());
    }

    info!(interval_secs, "daemon mode (Ctrl+C to stop)");
    let mut cycle: u64 = 0;
    while !STOP.load(Ordering::Relaxed) {
        cycle += 1;
        if let Err(e) = run_one_cycle(&mut pipeline, &mut store, &readings_path).await {
            warn!(cycle, error = %e, "cycle failed");
        }
        for _ in 0..interval_secs {
            if STOP.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    info!("MineWatch agent stopping");
    Ok(())
}

fn main() -> Result<(), BoxError> {
    let config_path = std::env::var("MINEWATCH_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("minewatch.json"));
    let config = AgentConfig::try_load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);

    // A positional argument overrides the configured readings file.
    let readings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.readings_path.clone());
    info!(
        config = %config_path.display(),
        readings = %readings_path.display(),
        "MineWatch agent starting"
    );

    let _ = ctrlc::set_handler(|| {
        STOP.store(true, Ordering::Relaxed);
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, readings_path))
}

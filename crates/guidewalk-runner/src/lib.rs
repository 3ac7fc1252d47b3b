//! guidewalk-runner: the headless-browser adapter and the exploration
//! entrypoints built on it.

pub mod chromium;
pub mod config;
pub mod portal;
pub mod script;

use anyhow::{Context, Result};
use guidewalk::progress::{self, ProgressEventKind, ProgressReceiver};
use guidewalk::{
    ControllerConfig, Domain, DomainDescriptor, RunBudget, RunController, RunReport, Sequencer, SequencerPolicy,
    Strategy, SupervisedSession, TaxonomyStore, Traversal, WizardExpander,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::portal::{PortalOptions, PortalSessionProvider};

/// Install the stderr fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one exploration from environment configuration and print its
/// statistics block on stdout.
pub async fn explore(domain: Domain, strategy: Strategy, limit: Duration) -> Result<RunReport> {
    let config = RunnerConfig::from_env().unwrap_or_else(|e| e.exit());
    init_tracing(&config.log_level);

    let db_path = config.db_path();
    let store = Arc::new(
        TaxonomyStore::open(&db_path).with_context(|| format!("failed to open {}", db_path.display()))?,
    );
    if config.legacy_locations.is_some() || config.legacy_lines.is_some() {
        store
            .import_legacy_json(config.legacy_locations.as_deref(), config.legacy_lines.as_deref())
            .context("legacy cache import failed")?;
    }

    let label = format!("explore-{domain}s-{strategy}");
    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run = %label, run_id = %run_id, db = %db_path.display(), "starting");

    let (tx, rx) = progress::channel();
    let progress_log = tokio::spawn(log_progress(rx));

    let descriptor = DomainDescriptor::new(domain);
    let provider = Arc::new(PortalSessionProvider::new(PortalOptions::from(&config)));
    let session = SupervisedSession::new(provider);
    let mut expander = WizardExpander::new(session, Sequencer::new(descriptor.clone(), SequencerPolicy::default()));
    let mut traversal = Traversal::new(strategy, descriptor, store.clone()).with_progress(tx.clone(), run_id);
    let mut controller = RunController::new(ControllerConfig::default(), RunBudget::start(limit)).with_progress(tx);

    let report = controller.run(&label, &mut traversal, &mut expander).await;
    drop(traversal);
    drop(controller);
    let _ = progress_log.await;

    println!("{report}");
    let totals = store.stats().context("failed to read store totals")?;
    println!(
        "store: {} prefectures, {} wards, {} towns, {} lines, {} stations",
        totals.prefectures, totals.wards, totals.towns, totals.lines, totals.stations
    );
    Ok(report)
}

/// Forward progress events to the debug log until every sender is gone.
async fn log_progress(mut rx: ProgressReceiver) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match rx.recv().await {
            Ok(event) => match &event.event {
                ProgressEventKind::Snapshot { .. } | ProgressEventKind::RunFinished { .. } => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        info!(target: "guidewalk_runner::progress", "{}", json);
                    }
                }
                _ => debug!(target: "guidewalk_runner::progress", seq = event.seq, "{:?}", event.event),
            },
            Err(RecvError::Lagged(n)) => debug!("progress log skipped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

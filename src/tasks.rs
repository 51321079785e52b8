//! Background crawl scheduling.
//!
//! Every crawl runs in its own tokio task with its own cancellation channel. The
//! channel is tripped by the crawl's max-runtime timer or by a scheduler-wide
//! shutdown, and the orchestrator checks it between items and between pages.

use crate::apis::{create_source, EventSource};
use crate::constants;
use crate::pipeline::{CrawlReport, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct IngestionScheduler {
    orchestrator: Orchestrator,
    shutdown: Arc<watch::Sender<bool>>,
}

impl IngestionScheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            orchestrator,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Ask every running and future crawl to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Start a bounded crawl of `source_name` in the background. Returns false for
    /// an unknown source; completion is only visible through storage and logs.
    pub fn start_ingestion(&self, source_name: &str) -> bool {
        match create_source(source_name) {
            Some(source) => {
                info!("Starting ingestion for {}", source_name);
                drop(self.spawn_crawl(source));
                true
            }
            None => {
                warn!("Unknown source '{}'", source_name);
                false
            }
        }
    }

    /// Spawn a crawl of `source` that stops itself after the configured max runtime.
    pub fn spawn_crawl(&self, source: Arc<dyn EventSource>) -> JoinHandle<CrawlReport> {
        let orchestrator = self.orchestrator.clone();
        let max_runtime = orchestrator.crawl_config().max_runtime();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let (cancel_tx, cancel_rx) = watch::channel(*shutdown.borrow());
            let crawl = orchestrator.run_source(source.as_ref(), cancel_rx);
            tokio::pin!(crawl);
            let deadline = tokio::time::sleep(max_runtime);
            tokio::pin!(deadline);

            let mut cancelled = false;
            let mut watching_shutdown = true;
            loop {
                tokio::select! {
                    report = &mut crawl => return report,
                    _ = &mut deadline, if !cancelled => {
                        warn!(
                            "{} exceeded max runtime of {:?}, cancelling",
                            source.source_name(),
                            max_runtime
                        );
                        let _ = cancel_tx.send(true);
                        cancelled = true;
                    }
                    changed = shutdown.changed(), if watching_shutdown && !cancelled => {
                        match changed {
                            Ok(()) if *shutdown.borrow() => {
                                info!("Shutdown requested, cancelling {}", source.source_name());
                                let _ = cancel_tx.send(true);
                                cancelled = true;
                            }
                            Ok(()) => {}
                            // Scheduler dropped; only the deadline can stop us now.
                            Err(_) => watching_shutdown = false,
                        }
                    }
                }
            }
        })
    }

    /// Crawl every supported source concurrently and wait for all of them.
    pub async fn run_all(&self) -> Vec<CrawlReport> {
        self.run_sources(&constants::get_supported_sources()).await
    }

    /// Crawl the named sources concurrently. Unknown names are logged and skipped.
    pub async fn run_sources(&self, names: &[&str]) -> Vec<CrawlReport> {
        let handles: Vec<_> = names
            .iter()
            .filter_map(|name| match create_source(name) {
                Some(source) => Some(self.spawn_crawl(source)),
                None => {
                    warn!("Unknown source '{}'", name);
                    None
                }
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => error!("Crawl task failed: {}", e),
            }
        }
        reports
    }

    /// Crawl every source now and then once per `interval` until shutdown. A zero
    /// interval runs a single round.
    pub async fn run_periodic(&self, interval: Duration) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let reports = self.run_all().await;
            let created: usize = reports.iter().map(|r| r.created).sum();
            info!("Scheduled ingestion created {} events", created);
            if interval.is_zero() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Ingestion scheduler stopped");
    }
}

use crate::currency::CurrencyConverter;
use crate::error::RunError;
use crate::reconcile::{OfferReconciler, ReconcileReport};
use crate::steam::StoreAdapter;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Upper bound on a whole cycle unless overridden with `with_run_timeout`.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of one fetch-and-reconcile cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub fetched: usize,
    #[serde(flatten)]
    pub report: ReconcileReport,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Run counters exposed on the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
}

/// One fetch, normalize and reconcile cycle, never two at once.
pub struct JobRunner {
    adapter: Arc<dyn StoreAdapter>,
    converter: Option<Arc<CurrencyConverter>>,
    reconciler: OfferReconciler,
    fetch_timeout: Duration,
    run_timeout: Duration,
    in_flight: Mutex<()>,
    stats: RwLock<RunStats>,
}

impl JobRunner {
    pub fn new(
        adapter: Arc<dyn StoreAdapter>,
        converter: Option<Arc<CurrencyConverter>>,
        reconciler: OfferReconciler,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            converter,
            reconciler,
            fetch_timeout,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            in_flight: Mutex::new(()),
            stats: RwLock::new(RunStats::default()),
        }
    }

    /// Bounds the whole cycle, persistence and notification included.
    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Runs one cycle to completion.
    ///
    /// Returns `RunError::AlreadyRunning` without doing anything when another
    /// cycle holds the runner. The runner is released when the cycle ends or
    /// times out.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let _guard = self.in_flight.try_lock().map_err(|_| RunError::AlreadyRunning)?;
        tokio::time::timeout(self.run_timeout, self.cycle())
            .await
            .map_err(|_| RunError::Timeout {
                stage: "run",
                after: self.run_timeout,
            })?
    }

    async fn cycle(&self) -> Result<RunSummary, RunError> {
        let started_at = Utc::now().timestamp_millis();

        let offers = tokio::time::timeout(self.fetch_timeout, self.adapter.fetch_trending())
            .await
            .map_err(|_| RunError::Timeout {
                stage: "store fetch",
                after: self.fetch_timeout,
            })??;
        let fetched = offers.len();
        info!("[Job] {} returned {} offer(s)", self.adapter.name(), fetched);

        let offers = match &self.converter {
            Some(converter) => converter.normalize_offers(offers).await?,
            None => offers,
        };

        let report = self.reconciler.upsert_offers_and_notify(offers).await;

        Ok(RunSummary {
            fetched,
            report,
            started_at,
            finished_at: Utc::now().timestamp_millis(),
        })
    }

    /// Scheduler entry point: runs a cycle and handles its outcome.
    ///
    /// Nothing escapes this call; the next trigger proceeds regardless.
    pub async fn trigger(&self) {
        let outcome = self.run_once().await;
        let mut stats = self.stats.write().await;
        match outcome {
            Ok(summary) => {
                info!(
                    "[Job] Run complete in {}ms: {} created, {} updated, {} notified",
                    summary.finished_at - summary.started_at,
                    summary.report.created,
                    summary.report.updated,
                    summary.report.notified
                );
                stats.completed += 1;
                stats.last_summary = Some(summary);
            }
            Err(RunError::AlreadyRunning) => {
                warn!("[Job] Previous run still in progress, skipping trigger");
                stats.skipped += 1;
            }
            Err(e) => {
                error!("[Job] Run failed: {}", e);
                stats.failed += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }

    pub async fn stats(&self) -> RunStats {
        self.stats.read().await.clone()
    }
}

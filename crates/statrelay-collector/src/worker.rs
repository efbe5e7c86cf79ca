//! Per-target scheduling loop.
//!
//! One worker serves one monitored instance. The loop polls on a short
//! fixed tick so stop and reload requests are observed promptly whatever
//! the configured snapshot frequency; configuration swaps happen only at
//! iteration boundaries, never mid-cycle.

use crate::control::{ControlState, WorkerHandle};
use crate::error::{RelayError, Result};
use crate::session::Sessions;
use crate::snapshot;
use statrelay_common::types::{RepositoryConfig, TargetConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Polling tick, independent of the snapshot frequency.
const TICK: Duration = Duration::from_millis(100);

/// The per-target worker unit.
///
/// Owns its two sessions and all of its state; workers share nothing with
/// each other. Constructed together with the [`WorkerHandle`] the owning
/// supervisor keeps.
pub struct Worker {
    name: String,
    state: Arc<ControlState>,
    repository: RepositoryConfig,
    config: TargetConfig,
    sessions: Sessions,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        repository: RepositoryConfig,
        config: TargetConfig,
    ) -> (Self, WorkerHandle) {
        let name = name.into();
        let state = ControlState::new(config.clone());
        let handle = WorkerHandle::new(name.clone(), state.clone());
        let sessions = Sessions::new(name.clone(), state.clone());
        let worker = Self {
            name,
            state,
            repository,
            config,
            sessions,
        };
        (worker, handle)
    }

    /// Runs the scheduling loop; returns only after full shutdown.
    ///
    /// Fatal failures (unreachable database, missing extension) stop this
    /// worker; restart policy belongs to the owning supervisor.
    pub async fn run(mut self) {
        let span = tracing::info_span!("worker", name = %self.name);
        async move {
            if self.state.stopping() {
                return;
            }
            tracing::info!("starting worker");
            if let Err(e) = self.worker_main().await {
                tracing::error!(error = %e, "worker failed");
                self.state.set_stopping();
            }
            self.sessions.disconnect_all();
            tracing::info!("stopped");
        }
        .instrument(span)
        .await
    }

    async fn worker_main(&mut self) -> Result<()> {
        self.sessions
            .ensure_connected(&self.repository, &self.config)
            .await?;
        self.check_extension().await?;

        let mut last_cycle = Instant::now();
        let mut first_snapshot_taken = false;

        while !self.state.stopping() {
            if self.state.reload_requested() {
                self.reload();
            }

            if cycle_due(
                first_snapshot_taken,
                last_cycle.elapsed(),
                self.config.frequency(),
            ) {
                let report =
                    snapshot::take_snapshot(&mut self.sessions, &self.repository, &self.config)
                        .await?;
                tracing::info!(
                    srvid = self.config.srvid,
                    sources = report.sources.len(),
                    rows = report.rows_staged(),
                    skipped = report.skipped(),
                    "snapshot cycle complete"
                );
                last_cycle = Instant::now();
                first_snapshot_taken = true;
            }

            tokio::time::sleep(TICK).await;
        }

        Ok(())
    }

    /// One-time precondition after the first connect: the repository must
    /// carry the statmon extension, otherwise the worker is misconfigured
    /// and stops without attempting a cycle.
    async fn check_extension(&self) -> Result<()> {
        let repo = self.sessions.repository()?;
        let row = repo
            .query_one(
                "SELECT count(*) FROM pg_extension WHERE extname = 'statmon'",
                &[],
            )
            .await?;
        let found: i64 = row.get(0);
        if found != 1 {
            tracing::error!("statmon extension not found on the repository");
            return Err(RelayError::ExtensionMissing);
        }
        Ok(())
    }

    /// Adopts the pending configuration and drops both sessions;
    /// reconnection happens lazily at the next orchestration call.
    fn reload(&mut self) {
        tracing::info!("reloading configuration");
        self.state.clear_reload();
        if let Some(config) = self.state.take_pending() {
            self.state.set_active(config.clone());
            self.config = config;
        }
        self.sessions.disconnect_all();
    }
}

/// The first cycle runs immediately on start; later ones wait out the
/// configured frequency since the last cycle's completion.
fn cycle_due(first_snapshot_taken: bool, elapsed: Duration, frequency: Duration) -> bool {
    !first_snapshot_taken || elapsed >= frequency
}

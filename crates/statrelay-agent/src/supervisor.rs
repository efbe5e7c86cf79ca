use statrelay_collector::{Worker, WorkerHandle};
use statrelay_common::types::{RepositoryConfig, TargetConfig};
use std::collections::HashMap;
use tokio::task::JoinHandle;

struct WorkerEntry {
    handle: WorkerHandle,
    join: JoinHandle<()>,
}

/// Owns the worker fleet: one worker task per configured target, keyed by
/// target name.
///
/// Workers hold no global state; everything flows through the handles kept
/// here. The repository connection settings are fixed for the lifetime of
/// the process — changing them requires a restart.
pub struct Supervisor {
    repository: RepositoryConfig,
    workers: HashMap<String, WorkerEntry>,
}

impl Supervisor {
    pub fn new(repository: RepositoryConfig) -> Self {
        Self {
            repository,
            workers: HashMap::new(),
        }
    }

    /// Reconciles the running fleet with the configured targets: spawns
    /// workers for new targets, reloads changed ones, stops removed ones.
    /// A worker that stopped on a fatal error is respawned here, so a
    /// SIGHUP resync doubles as the manual restart lever.
    pub fn sync(&mut self, servers: HashMap<String, TargetConfig>) {
        let gone: Vec<String> = self
            .workers
            .keys()
            .filter(|name| !servers.contains_key(*name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(entry) = self.workers.remove(&name) {
                tracing::info!(worker = %name, "target removed, stopping worker");
                entry.handle.request_stop();
                // Detached: the worker drains on its own tick.
            }
        }

        for (name, config) in servers {
            match self.workers.get(&name) {
                Some(entry) if !entry.join.is_finished() => {
                    if entry.handle.current_config() != config {
                        tracing::info!(worker = %name, "target changed, asking reload");
                        entry.handle.request_reload(config);
                    }
                }
                _ => self.spawn(name, config),
            }
        }
    }

    fn spawn(&mut self, name: String, config: TargetConfig) {
        tracing::info!(worker = %name, srvid = config.srvid, "spawning worker");
        let (worker, handle) = Worker::new(name.clone(), self.repository.clone(), config);
        let join = tokio::spawn(worker.run());
        self.workers.insert(name, WorkerEntry { handle, join });
    }

    /// Requests stop on every worker, then waits for all of them to drain.
    pub async fn shutdown(self) {
        for entry in self.workers.values() {
            entry.handle.request_stop();
        }
        for (name, entry) in self.workers {
            if let Err(e) = entry.join.await {
                tracing::error!(worker = %name, error = %e, "worker task panicked");
            }
        }
    }

    pub fn handle(&self, name: &str) -> Option<&WorkerHandle> {
        self.workers.get(name).map(|entry| &entry.handle)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(srvid: i32) -> TargetConfig {
        TargetConfig {
            // Deliberately empty so test workers stop immediately with a
            // missing-descriptor error instead of touching the network.
            dsn: String::new(),
            srvid,
            frequency: 300,
        }
    }

    fn servers(names: &[(&str, i32)]) -> HashMap<String, TargetConfig> {
        names
            .iter()
            .map(|(name, srvid)| (name.to_string(), target(*srvid)))
            .collect()
    }

    #[tokio::test]
    async fn sync_reconciles_the_fleet() {
        let mut supervisor = Supervisor::new(RepositoryConfig { dsn: String::new() });

        supervisor.sync(servers(&[("alpha", 1), ("beta", 2)]));
        assert_eq!(supervisor.len(), 2);
        assert!(supervisor.handle("alpha").is_some());

        supervisor.sync(servers(&[("beta", 2)]));
        assert_eq!(supervisor.len(), 1);
        assert!(supervisor.handle("alpha").is_none());
        assert!(supervisor.handle("beta").is_some());

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_with_no_workers_returns() {
        let supervisor = Supervisor::new(RepositoryConfig { dsn: String::new() });
        supervisor.shutdown().await;
    }
}

//! Lifecycle of the two database sessions owned by a worker.
//!
//! Exactly one session per role at any time: one to the monitored
//! instance, one to the repository. Reconnecting always tears the previous
//! session down first; there is no pooling.

use crate::control::ControlState;
use crate::error::{RelayError, Result};
use statrelay_common::types::{RepositoryConfig, TargetConfig};
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};

pub(crate) const REMOTE: &str = "remote";
pub(crate) const REPOSITORY: &str = "repository";

pub(crate) struct Sessions {
    worker: String,
    control: Arc<ControlState>,
    remote: Option<Client>,
    repository: Option<Client>,
}

impl Sessions {
    pub(crate) fn new(worker: String, control: Arc<ControlState>) -> Self {
        Self {
            worker,
            control,
            remote: None,
            repository: None,
        }
    }

    /// Opens whichever session is currently absent; a no-op for sessions
    /// already established.
    ///
    /// On any failure both sessions are torn down and the error is
    /// returned; a target the agent cannot reach is not retried within the
    /// same run.
    pub(crate) async fn ensure_connected(
        &mut self,
        repository: &RepositoryConfig,
        target: &TargetConfig,
    ) -> Result<()> {
        match self.connect_missing(repository, target).await {
            Ok(()) => {
                self.control.set_connected(true);
                Ok(())
            }
            Err(e) => {
                self.disconnect_all();
                Err(e)
            }
        }
    }

    async fn connect_missing(
        &mut self,
        repository: &RepositoryConfig,
        target: &TargetConfig,
    ) -> Result<()> {
        if self.repository.is_none() {
            tracing::debug!("connecting to the repository");
            let label = format!("statrelay - repository for worker {}", self.worker);
            let client = self.open(REPOSITORY, &repository.dsn, &label).await?;
            tracing::debug!("repository session established");
            self.repository = Some(client);
        }

        if self.remote.is_none() {
            tracing::debug!("connecting to the remote instance");
            let label = format!("statrelay - worker {}", self.worker);
            let client = self.open(REMOTE, &target.dsn, &label).await?;
            tracing::debug!("remote session established");
            self.remote = Some(client);
        }

        Ok(())
    }

    async fn open(&self, role: &'static str, dsn: &str, label: &str) -> Result<Client> {
        if dsn.trim().is_empty() {
            return Err(RelayError::MissingDsn { role });
        }

        let mut config: tokio_postgres::Config = dsn
            .parse()
            .map_err(|source| RelayError::InvalidDsn { role, source })?;
        config.application_name(label);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|source| RelayError::Connect { role, source })?;

        // The driver task owns the socket; it finishes when the client is
        // dropped or the server ends the connection.
        let worker = self.worker.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(worker = %worker, role, error = %e, "session closed with error");
            }
        });

        Ok(client)
    }

    /// Closes both sessions, independently and tolerant of either being
    /// already absent. Both roles end up absent; never fails.
    pub(crate) fn disconnect_all(&mut self) {
        if self.remote.take().is_some() {
            tracing::info!("disconnecting from the remote instance");
        }
        if self.repository.take().is_some() {
            tracing::info!("disconnecting from the repository");
        }
        self.control.set_connected(false);
    }

    /// Closes only the repository session. Called after each cycle so no
    /// repository connection is held between cycles; the remote session
    /// stays warm for the next one.
    pub(crate) fn disconnect_repository(&mut self) {
        if self.repository.take().is_some() {
            tracing::debug!("disconnecting from the repository until next cycle");
        }
    }

    pub(crate) fn remote(&self) -> Result<&Client> {
        self.remote.as_ref().ok_or(RelayError::NotConnected { role: REMOTE })
    }

    pub(crate) fn repository(&self) -> Result<&Client> {
        self.repository
            .as_ref()
            .ok_or(RelayError::NotConnected { role: REPOSITORY })
    }

    /// Both sessions at once, for the orchestrator's fetch/relay loop.
    pub(crate) fn pair(&self) -> Result<(&Client, &Client)> {
        Ok((self.remote()?, self.repository()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> Sessions {
        let control = ControlState::new(TargetConfig {
            dsn: "host=target".into(),
            srvid: 1,
            frequency: 300,
        });
        Sessions::new("t1".into(), control)
    }

    fn repo(dsn: &str) -> RepositoryConfig {
        RepositoryConfig { dsn: dsn.into() }
    }

    fn target(dsn: &str) -> TargetConfig {
        TargetConfig {
            dsn: dsn.into(),
            srvid: 1,
            frequency: 300,
        }
    }

    #[tokio::test]
    async fn empty_repository_dsn_is_fatal() {
        let mut sessions = sessions();
        let err = sessions
            .ensure_connected(&repo(""), &target("host=target"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingDsn { role: REPOSITORY }));
    }

    #[tokio::test]
    async fn unparsable_dsn_is_fatal() {
        let mut sessions = sessions();
        let err = sessions
            .ensure_connected(&repo("this is ="), &target("host=target"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidDsn { role: REPOSITORY, .. }));
    }

    #[tokio::test]
    async fn sessions_absent_until_connected() {
        let sessions = sessions();
        assert!(sessions.remote().is_err());
        assert!(sessions.repository().is_err());
        assert!(sessions.pair().is_err());
    }

    #[tokio::test]
    async fn disconnect_all_tolerates_absent_sessions() {
        let mut sessions = sessions();
        sessions.disconnect_all();
        sessions.disconnect_all();
        sessions.disconnect_repository();
    }
}

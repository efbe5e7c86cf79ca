/// Worker-stopping failures of the snapshot engine.
///
/// Every variant is fatal for the worker that hits it: the loop disconnects
/// both sessions and transitions to stopped, leaving restart policy to the
/// owning supervisor. Source-local failures (a fetch or insert going wrong
/// for one data source) are not errors at this level — they are handled in
/// place with a savepoint rollback and the cycle carries on.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A connection descriptor is missing from the configuration.
    #[error("missing connection string for the {role} session")]
    MissingDsn { role: &'static str },

    /// The connection string could not be parsed.
    #[error("invalid connection string for the {role} session: {source}")]
    InvalidDsn {
        role: &'static str,
        source: tokio_postgres::Error,
    },

    /// Establishing a session failed.
    #[error("failed to connect to the {role} session: {source}")]
    Connect {
        role: &'static str,
        source: tokio_postgres::Error,
    },

    /// The repository database does not have the statmon extension.
    #[error("statmon extension not installed on the repository")]
    ExtensionMissing,

    /// A session that the engine expected to be open was absent. Internal
    /// invariant violation; should not happen after `ensure_connected`.
    #[error("no open {role} session")]
    NotConnected { role: &'static str },

    /// Any other database error outside the per-source savepoint scope
    /// (transaction control, catalog query, finalize, commit).
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

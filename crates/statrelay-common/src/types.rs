use serde::Deserialize;
use std::time::Duration;

/// Connection settings for the central repository database.
///
/// The repository holds the `statmon` extension and receives every row
/// relayed from the monitored targets. Supplied once at startup and shared
/// by all workers.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// libpq-style connection string, e.g. `host=repo dbname=statmon`.
    pub dsn: String,
}

/// Per-target collection settings.
///
/// One monitored instance per entry. A `TargetConfig` is immutable once a
/// collection cycle starts; a reload replaces it wholesale at a loop
/// iteration boundary, it is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetConfig {
    /// libpq-style connection string for the monitored instance.
    pub dsn: String,
    /// Repository-side identifier for this target. The target itself always
    /// reports locally as id 0; rows are re-tagged with this value when
    /// relayed.
    pub srvid: i32,
    /// Seconds between snapshot cycles.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
}

fn default_frequency() -> u64 {
    300
}

impl TargetConfig {
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }
}

/// Outcome of the fetch-then-relay protocol for one data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// All fetched rows were staged on the repository.
    Relayed { rows: u64 },
    /// The source identifier has no registered template; nothing was done.
    Unsupported,
    /// The fetch query failed on the remote instance (source not installed
    /// there); treated as an empty result for this cycle.
    FetchFailed,
    /// An insert failed on the repository; every row staged for this source
    /// this cycle was rolled back.
    InsertAborted,
}

/// Per-source result of one collection cycle.
#[derive(Debug, Clone)]
pub struct SourceResult {
    /// Display name of the data source, as declared in the remote catalog.
    pub name: String,
    pub outcome: SourceOutcome,
}

/// Summary of one full collection cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sources: Vec<SourceResult>,
    /// Error count returned by `statmon_take_snapshot`; non-zero is
    /// advisory, the cycle is still considered complete.
    pub finalize_errors: i32,
}

impl CycleReport {
    /// Total rows staged across all relayed sources.
    pub fn rows_staged(&self) -> u64 {
        self.sources
            .iter()
            .map(|s| match s.outcome {
                SourceOutcome::Relayed { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Number of sources that did not fully relay this cycle.
    pub fn skipped(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| !matches!(s.outcome, SourceOutcome::Relayed { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_config_defaults_frequency() {
        let cfg: TargetConfig = toml::from_str(
            r#"
            dsn = "host=db1 dbname=prod"
            srvid = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.frequency, 300);
        assert_eq!(cfg.frequency(), Duration::from_secs(300));
    }

    #[test]
    fn target_config_missing_srvid_is_rejected() {
        let res: Result<TargetConfig, _> = toml::from_str(r#"dsn = "host=db1""#);
        assert!(res.is_err());
    }

    #[test]
    fn cycle_report_counts_rows_and_skips() {
        let report = CycleReport {
            sources: vec![
                SourceResult {
                    name: "statements".into(),
                    outcome: SourceOutcome::Relayed { rows: 40 },
                },
                SourceResult {
                    name: "relations".into(),
                    outcome: SourceOutcome::FetchFailed,
                },
                SourceResult {
                    name: "databases".into(),
                    outcome: SourceOutcome::Relayed { rows: 2 },
                },
                SourceResult {
                    name: "kcache".into(),
                    outcome: SourceOutcome::InsertAborted,
                },
            ],
            finalize_errors: 0,
        };
        assert_eq!(report.rows_staged(), 42);
        assert_eq!(report.skipped(), 2);
    }
}

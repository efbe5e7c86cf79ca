//! One collection cycle: resolve sources, fetch-then-relay each with
//! savepoint isolation, finalize, commit.
//!
//! A broken or missing data source degrades that source's metrics for one
//! cycle without touching its siblings: the remote fetch and the
//! repository inserts each run under a savepoint scoped to the current
//! source. Durability is deferred to a single end-of-cycle commit per
//! session.

use crate::catalog::{self, SourceFunction, SourceTemplate};
use crate::error::Result;
use crate::session::Sessions;
use crate::value::TextValue;
use statrelay_common::types::{
    CycleReport, RepositoryConfig, SourceOutcome, SourceResult, TargetConfig,
};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, SimpleQueryMessage, SimpleQueryRow};

/// Runs one full snapshot cycle for `target`.
///
/// Connects whatever is not connected yet, relays every enabled data
/// source in priority order, invokes the repository-side finalize call and
/// commits both sessions — repository first, then remote. The two commits
/// are independent: there is no two-phase commit across the sessions, and
/// a failure between them leaves one side durable. The repository session
/// is closed afterwards; the remote session stays open for the next cycle.
///
/// # Errors
///
/// Only worker-stopping failures surface here (connection loss,
/// transaction control, the catalog query, finalize, commit). Per-source
/// fetch and insert failures are absorbed into the returned
/// [`CycleReport`].
pub(crate) async fn take_snapshot(
    sessions: &mut Sessions,
    repository: &RepositoryConfig,
    target: &TargetConfig,
) -> Result<CycleReport> {
    sessions.ensure_connected(repository, target).await?;

    let report = {
        let (remote, repo) = sessions.pair()?;
        run_cycle(remote, repo, target.srvid).await?
    };

    sessions.disconnect_repository();
    Ok(report)
}

async fn run_cycle(remote: &Client, repo: &Client, srvid: i32) -> Result<CycleReport> {
    // One transaction per session for the whole cycle.
    remote.batch_execute("BEGIN").await?;
    repo.batch_execute("BEGIN").await?;

    let sources = catalog::resolve_sources(remote, srvid).await?;
    tracing::debug!(count = sources.len(), "resolved enabled data sources");

    let mut results = Vec::with_capacity(sources.len());
    for source in sources {
        let outcome = relay_source(remote, repo, srvid, &source).await?;
        results.push(SourceResult {
            name: source.name,
            outcome,
        });
    }

    tracing::debug!(srvid, "finalizing snapshot");
    let row = repo
        .query_one("SELECT statmon_take_snapshot($1)", &[&srvid])
        .await?;
    let finalize_errors: i32 = row.get(0);
    if finalize_errors != 0 {
        tracing::warn!(
            errors = finalize_errors,
            "repository reported errors while finalizing the snapshot"
        );
    }

    // Repository first, then remote. No distributed transaction: if the
    // second commit fails, the first is already durable.
    tracing::debug!("committing transactions");
    repo.batch_execute("COMMIT").await?;
    remote.batch_execute("COMMIT").await?;

    Ok(CycleReport {
        sources: results,
        finalize_errors,
    })
}

/// Fetch-then-relay for a single data source.
async fn relay_source(
    remote: &Client,
    repo: &Client,
    srvid: i32,
    source: &SourceFunction,
) -> Result<SourceOutcome> {
    let Some(query_source) = source.query_source.as_deref() else {
        tracing::warn!(source = %source.name, "no query source declared, skipping");
        return Ok(SourceOutcome::Unsupported);
    };
    let Some(template) = catalog::template_for(query_source) else {
        tracing::warn!(source = %source.name, query_source, "unsupported data source, skipping");
        return Ok(SourceOutcome::Unsupported);
    };

    // The source function may not be installed on this instance; the
    // savepoint keeps a failed fetch from aborting the rest of the cycle.
    remote.batch_execute("SAVEPOINT fetch").await?;
    tracing::debug!(function = template.function, "fetching source rows");
    let rows = match fetch_rows(remote, template, srvid).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "fetch failed, treating source as empty");
            remote.batch_execute("ROLLBACK TO SAVEPOINT fetch").await?;
            return Ok(SourceOutcome::FetchFailed);
        }
    };

    // Same isolation on the repository side: a failed insert discards
    // every row staged for this source this cycle, nothing more.
    repo.batch_execute("SAVEPOINT relay").await?;
    let insert = match repo.prepare(template.insert_sql).await {
        Ok(statement) => statement,
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "insert template rejected, giving up on this source");
            repo.batch_execute("ROLLBACK TO SAVEPOINT relay").await?;
            return Ok(SourceOutcome::InsertAborted);
        }
    };

    let mut staged: u64 = 0;
    for row in &rows {
        let values = row_values(row);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        match repo.execute(&insert, &params).await {
            Ok(_) => staged += 1,
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "error while inserting data");
                tracing::warn!(source = %source.name, discarded = staged, "giving up on this source for this cycle");
                repo.batch_execute("ROLLBACK TO SAVEPOINT relay").await?;
                return Ok(SourceOutcome::InsertAborted);
            }
        }
    }

    Ok(SourceOutcome::Relayed { rows: staged })
}

/// Runs the fetch query over the simple-query protocol, yielding every
/// column as text. The first column is the repository-side srvid the
/// template prepended.
async fn fetch_rows(
    remote: &Client,
    template: &SourceTemplate,
    srvid: i32,
) -> std::result::Result<Vec<SimpleQueryRow>, tokio_postgres::Error> {
    let messages = remote.simple_query(&template.fetch_query(srvid)).await?;
    Ok(messages
        .into_iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect())
}

/// Column values in fetch order, relayed opaquely.
fn row_values(row: &SimpleQueryRow) -> Vec<TextValue> {
    (0..row.len()).map(|i| TextValue::new(row.get(i))).collect()
}

//! Registry of supported data sources.
//!
//! Each entry pairs the remote source function with the insert template
//! used to stage its rows on the repository. Adding a data source is a new
//! registry entry; the snapshot engine never branches on source names.

use crate::error::Result;
use tokio_postgres::Client;

/// Fetch/insert pair for one data source.
pub struct SourceTemplate {
    /// Name of the `statmon_*_src` function on the monitored instance,
    /// which doubles as the source identifier in the remote catalog.
    pub function: &'static str,
    /// Insert into the repository-side staging table. The first parameter
    /// is the repository-side srvid, the rest are the source function's
    /// columns in declaration order.
    pub insert_sql: &'static str,
}

impl SourceTemplate {
    /// Query pulling this source's rows from the monitored instance.
    ///
    /// The instance always reports about itself under the local id 0; the
    /// leading column re-tags every row with the repository-side `srvid`.
    pub fn fetch_query(&self, srvid: i32) -> String {
        format!("SELECT {}, * FROM {}(0)", srvid, self.function)
    }
}

/// One enabled snapshot function, as listed by the remote catalog.
pub struct SourceFunction {
    /// Source identifier to look up in [`template_for`]; NULL when the
    /// catalog entry declares no query source.
    pub query_source: Option<String>,
    /// Display name, used in logs and cycle reports.
    pub name: String,
}

/// Lists the data sources enabled for snapshots on the monitored instance,
/// ordered by ascending priority.
///
/// Re-derived every cycle on purpose: enabling, disabling or re-ordering a
/// source on the monitored side takes effect on the next cycle without a
/// reload.
pub async fn resolve_sources(remote: &Client, srvid: i32) -> Result<Vec<SourceFunction>> {
    let rows = remote
        .query(
            "SELECT query_source, function_name \
             FROM statmon_functions \
             WHERE operation = 'snapshot' AND enabled AND srvid = $1 \
             ORDER BY priority",
            &[&srvid],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| SourceFunction {
            query_source: row.get(0),
            name: row.get(1),
        })
        .collect())
}

/// Looks up the template registered for a source identifier.
pub fn template_for(query_source: &str) -> Option<&'static SourceTemplate> {
    SOURCES.iter().find(|t| t.function == query_source)
}

pub static SOURCES: &[SourceTemplate] = &[
    SourceTemplate {
        function: "statmon_databases_src",
        insert_sql: "INSERT INTO statmon_databases_src_tmp (\
             srvid, oid, datname\
             ) VALUES ($1, $2, $3)",
    },
    SourceTemplate {
        function: "statmon_statements_src",
        insert_sql: "INSERT INTO statmon_statements_src_tmp (\
             srvid, ts, userid, dbid, queryid, query, calls, total_time, \
             rows, shared_blks_hit, shared_blks_read, shared_blks_dirtied, \
             shared_blks_written, local_blks_hit, local_blks_read, \
             local_blks_dirtied, local_blks_written, temp_blks_read, \
             temp_blks_written, blk_read_time, blk_write_time\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21)",
    },
    SourceTemplate {
        function: "statmon_user_functions_src",
        insert_sql: "INSERT INTO statmon_user_functions_src_tmp (\
             srvid, ts, dbid, funcid, calls, total_time, self_time\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    },
    SourceTemplate {
        function: "statmon_relations_src",
        insert_sql: "INSERT INTO statmon_relations_src_tmp (\
             srvid, ts, dbid, relid, numscan, tup_returned, tup_fetched, \
             n_tup_ins, n_tup_upd, n_tup_del, n_tup_hot_upd, n_liv_tup, \
             n_dead_tup, n_mod_since_analyze, blks_read, blks_hit, \
             last_vacuum, vacuum_count, last_autovacuum, autovacuum_count, \
             last_analyze, analyze_count, last_autoanalyze, autoanalyze_count\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)",
    },
    SourceTemplate {
        function: "statmon_kcache_src",
        insert_sql: "INSERT INTO statmon_kcache_src_tmp (\
             srvid, ts, queryid, userid, dbid, reads, writes, user_time, \
             system_time\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    },
    SourceTemplate {
        function: "statmon_qualstats_src",
        insert_sql: "INSERT INTO statmon_qualstats_src_tmp (\
             srvid, ts, uniquequalnodeid, dbid, userid, qualnodeid, \
             occurrences, execution_count, nbfiltered, queryid, \
             constvalues, quals\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    },
    SourceTemplate {
        function: "statmon_wait_sampling_src",
        insert_sql: "INSERT INTO statmon_wait_sampling_src_tmp (\
             srvid, ts, dbid, event_type, event, queryid, count\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_is_unsupported() {
        assert!(template_for("statmon_bgwriter_src").is_none());
        assert!(template_for("").is_none());
    }

    #[test]
    fn every_registered_source_resolves_to_itself() {
        for template in SOURCES {
            let found = template_for(template.function).unwrap();
            assert_eq!(found.function, template.function);
        }
    }

    #[test]
    fn fetch_query_tags_rows_with_the_real_srvid() {
        let template = template_for("statmon_databases_src").unwrap();
        assert_eq!(
            template.fetch_query(7),
            "SELECT 7, * FROM statmon_databases_src(0)"
        );
    }

    /// The staging column list and the placeholder list must stay in sync,
    /// with srvid leading and the table named after the source function.
    #[test]
    fn insert_templates_are_positionally_consistent() {
        for template in SOURCES {
            let sql = template.insert_sql;
            let open = sql.find('(').unwrap();
            let close = sql.find(')').unwrap();
            let columns: Vec<&str> = sql[open + 1..close]
                .split(',')
                .map(str::trim)
                .collect();
            let placeholders = sql.matches('$').count();

            assert_eq!(
                columns.len(),
                placeholders,
                "column/placeholder mismatch for {}",
                template.function
            );
            assert_eq!(columns[0], "srvid", "{}", template.function);
            assert!(
                sql.contains(&format!("{}_tmp", template.function)),
                "staging table not named after {}",
                template.function
            );
            assert!(sql.contains(&format!("${}", placeholders)));
        }
    }
}

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::error::{Result, SyncError};
use super::events::{EventSink, SyncEvent};
use super::executor::{quote_ident, QueryExecutor};
use super::table::{TableOutcome, TableSynchronizer};
use super::TableDescriptor;
use crate::config::{StoreConfig, SyncConfig};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub table: TableDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TableOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub run_id: String,
    pub tables_synced: usize,
    pub tables_failed: usize,
    pub total_records: usize,
    pub tables: Vec<TableReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

/// Read-only connection to the source store, held for one session.
pub struct SourcePool {
    conn: Option<Connection>,
}

impl SourcePool {
    pub fn open(store: &StoreConfig, busy_timeout: Duration) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = open_store(store, flags, busy_timeout, "source")?;
        tracing::debug!(path = %store.path.to_string_lossy(), "source pool opened");
        Ok(Self { conn: Some(conn) })
    }

    pub fn conn(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn close(mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| SyncError::Database(e))?;
            tracing::debug!("source pool closed");
        }
        Ok(())
    }
}

impl Drop for SourcePool {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("source pool released");
        }
    }
}

fn open_store(
    store: &StoreConfig,
    flags: OpenFlags,
    busy_timeout: Duration,
    label: &'static str,
) -> Result<Connection> {
    let connectivity = |source| SyncError::Connectivity {
        store: label,
        source,
    };
    let conn = Connection::open_with_flags(&store.path, flags).map_err(connectivity)?;
    conn.busy_timeout(busy_timeout).map_err(connectivity)?;
    // A file that is not a database only fails on first read.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
        .map_err(connectivity)?;
    for (alias, path) in &store.schemas {
        conn.execute(
            &format!("ATTACH DATABASE ? AS {}", quote_ident(alias)),
            [path.to_string_lossy().to_string()],
        )
        .map_err(connectivity)?;
    }
    Ok(conn)
}

pub fn open_destination(config: &SyncConfig) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    open_store(
        &config.destination,
        flags,
        Duration::from_millis(config.busy_timeout_ms),
        "destination",
    )
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Runs one sync session and always finishes the stream with `done`.
///
/// Configuration and connectivity problems are reported as a single `error`
/// event before any table is touched.
pub fn run_session(
    config: &SyncConfig,
    tables: &[TableDescriptor],
    sink: &mut dyn EventSink,
) -> SessionSummary {
    let run_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("sync_session", run_id = %run_id);
    let _enter = span.enter();
    tracing::info!(tables = tables.len(), "sync session started");

    let (pool, destination) = match connect(config) {
        Ok(v) => v,
        Err(e) => return finish(run_id, fail(&e, sink), sink),
    };
    let summary = match pool.conn() {
        Some(source) => run_tables(source, &destination, tables, sink),
        None => SessionSummary::default(),
    };
    if let Err(e) = pool.close() {
        tracing::warn!("failed to close source pool: {}", e);
    }
    finish(run_id, summary, sink)
}

/// Ends a stream that could not start a session: one `error`, then `done`.
pub fn abort(error: &SyncError, sink: &mut dyn EventSink) -> SessionSummary {
    let run_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("sync_session", run_id = %run_id);
    let _enter = span.enter();
    finish(run_id, fail(error, sink), sink)
}

fn fail(error: &SyncError, sink: &mut dyn EventSink) -> SessionSummary {
    tracing::error!("sync session aborted: {}", error);
    sink.emit(&SyncEvent::Error {
        message: error.to_string(),
        schema: None,
        table: None,
    });
    SessionSummary {
        fatal: Some(error.to_string()),
        ..SessionSummary::default()
    }
}

fn finish(run_id: String, mut summary: SessionSummary, sink: &mut dyn EventSink) -> SessionSummary {
    summary.run_id = run_id;
    sink.emit(&SyncEvent::Done {
        tables_synced: summary.tables_synced,
        total_records: summary.total_records,
        timestamp: timestamp(),
    });
    tracing::info!(
        synced = summary.tables_synced,
        failed = summary.tables_failed,
        records = summary.total_records,
        "sync session finished"
    );
    summary
}

fn connect(config: &SyncConfig) -> Result<(SourcePool, Connection)> {
    config.validate()?;
    let pool = SourcePool::open(
        &config.source,
        Duration::from_millis(config.busy_timeout_ms),
    )?;
    let destination = open_destination(config)?;
    Ok((pool, destination))
}

/// Sequentially syncs `tables`; a failing table is reported and skipped.
/// Does not emit `done`.
pub fn run_tables(
    source: &dyn QueryExecutor,
    destination: &dyn QueryExecutor,
    tables: &[TableDescriptor],
    sink: &mut dyn EventSink,
) -> SessionSummary {
    let synchronizer = TableSynchronizer::new(source, destination);
    let mut summary = SessionSummary::default();

    for table in tables {
        sink.emit(&SyncEvent::Progress {
            schema: table.schema_name.clone(),
            table: table.table_name.clone(),
        });
        match synchronizer.sync(table) {
            Ok(outcome) => {
                let count = outcome.record_count();
                tracing::info!(
                    schema = %table.schema_name,
                    table = %table.table_name,
                    records = count,
                    "table synced"
                );
                summary.tables_synced += 1;
                summary.total_records += count;
                sink.emit(&SyncEvent::Complete {
                    schema: table.schema_name.clone(),
                    table: table.table_name.clone(),
                    record_count: count,
                });
                summary.tables.push(TableReport {
                    table: table.clone(),
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!(
                    schema = %table.schema_name,
                    table = %table.table_name,
                    "table sync failed: {}",
                    e
                );
                summary.tables_failed += 1;
                sink.emit(&SyncEvent::Error {
                    message: format!("{}.{}: {}", table.schema_name, table.table_name, e),
                    schema: Some(table.schema_name.clone()),
                    table: Some(table.table_name.clone()),
                });
                summary.tables.push(TableReport {
                    table: table.clone(),
                    outcome: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    summary
}

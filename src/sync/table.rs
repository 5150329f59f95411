use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::HashSet;

use super::error::{Result, SyncError};
use super::executor::{qualified, quote_ident, QueryExecutor, Row};
use super::policy::SyncPolicy;
use super::schema::SchemaInspector;
use super::TableDescriptor;

pub const IS_LOCALLY_EDITED: &str = "is_locally_edited";
pub const LAST_LOCAL_SYNC: &str = "last_local_sync";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Rows left alone because the destination copy is flagged as locally edited.
    pub preserved: usize,
    /// Source rows without a usable primary key.
    pub skipped: usize,
    pub deleted: usize,
}

impl TableOutcome {
    pub fn record_count(&self) -> usize {
        self.inserted + self.updated + self.preserved
    }
}

/// Copies one table from the source store into the destination store.
pub struct TableSynchronizer<'a> {
    source: &'a dyn QueryExecutor,
    destination: &'a dyn QueryExecutor,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> TableSynchronizer<'a> {
    pub fn new(source: &'a dyn QueryExecutor, destination: &'a dyn QueryExecutor) -> Self {
        Self {
            source,
            destination,
            clock: Utc::now,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> Value {
        Value::Text((self.clock)().to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn sync(&self, table: &TableDescriptor) -> Result<TableOutcome> {
        let policy = SyncPolicy::classify(&table.table_name);
        tracing::debug!(
            schema = %table.schema_name,
            table = %table.table_name,
            policy = policy.as_str(),
            "syncing table"
        );
        match policy {
            SyncPolicy::ForcedReplace => self.forced_replace(table),
            SyncPolicy::SelectiveMerge => self.selective_merge(table),
        }
    }

    fn fetch_source(&self, table: &TableDescriptor) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {}",
            qualified(&table.schema_name, &table.table_name)
        );
        Ok(self.source.query(&sql, &[])?)
    }

    fn destination_columns(&self, table: &TableDescriptor) -> Result<Vec<String>> {
        let inspector = SchemaInspector::new(self.destination, &table.schema_name);
        let columns = inspector.columns(&table.table_name)?;
        if columns.is_empty() {
            return Err(SyncError::MissingTable {
                schema: table.schema_name.clone(),
                table: table.table_name.clone(),
            });
        }
        Ok(columns)
    }

    fn forced_replace(&self, table: &TableDescriptor) -> Result<TableOutcome> {
        let target = qualified(&table.schema_name, &table.table_name);
        let rows = self.fetch_source(table)?;
        let dest_columns = self.destination_columns(table)?;
        let mut outcome = TableOutcome::default();

        // Rows already edited on the mirror outlive the replace.
        let sticky = dest_columns.iter().any(|c| c == IS_LOCALLY_EDITED);
        let mut kept_keys: HashSet<String> = HashSet::new();
        let mut pk = String::new();
        if sticky {
            pk = SchemaInspector::new(self.destination, &table.schema_name)
                .primary_key(&table.table_name)?;
            let sql = format!(
                "SELECT {pk} AS k FROM {target} WHERE {flag} = 1",
                pk = quote_ident(&pk),
                flag = quote_ident(IS_LOCALLY_EDITED),
            );
            kept_keys = self
                .destination
                .query(&sql, &[])?
                .iter()
                .filter_map(|r| r.get("k").and_then(value_key))
                .collect();
            outcome.deleted = self.destination.execute(
                &format!(
                    "DELETE FROM {target} WHERE COALESCE({}, 0) = 0",
                    quote_ident(IS_LOCALLY_EDITED)
                ),
                &[],
            )?;
        } else {
            outcome.deleted = self
                .destination
                .execute(&format!("DELETE FROM {target}"), &[])?;
        }

        if rows.is_empty() {
            return Ok(outcome);
        }

        let data_columns: Vec<String> = dest_columns
            .iter()
            .filter(|c| !is_metadata_column(c))
            .cloned()
            .collect();
        let has_last_sync = dest_columns.iter().any(|c| c == LAST_LOCAL_SYNC);
        let now = self.now();

        for row in &rows {
            if sticky {
                if let Some(key) = row.get(&pk).and_then(value_key) {
                    if kept_keys.contains(&key) {
                        self.touch_last_sync(&target, &pk, row.get(&pk), &now)?;
                        outcome.preserved += 1;
                        continue;
                    }
                }
            }
            let projected = row.project(&data_columns);
            if projected.len() < row.len() {
                tracing::debug!(
                    table = %table.table_name,
                    dropped = row.len() - projected.len(),
                    "source columns missing on destination"
                );
            }
            if projected.is_empty() {
                continue;
            }
            let mut extra = Vec::new();
            if sticky {
                extra.push((IS_LOCALLY_EDITED.to_string(), Value::Integer(0)));
            }
            if has_last_sync {
                extra.push((LAST_LOCAL_SYNC.to_string(), now.clone()));
            }
            self.insert_row(&target, &projected, extra)?;
            outcome.inserted += 1;
        }

        Ok(outcome)
    }

    fn selective_merge(&self, table: &TableDescriptor) -> Result<TableOutcome> {
        let target = qualified(&table.schema_name, &table.table_name);
        self.destination_columns(table)?;
        self.ensure_metadata_columns(table)?;

        let rows = self.fetch_source(table)?;
        let inspector = SchemaInspector::new(self.destination, &table.schema_name);
        let pk = inspector.primary_key(&table.table_name)?;
        let dest_columns = inspector.columns(&table.table_name)?;
        let data_columns: Vec<String> = dest_columns
            .iter()
            .filter(|c| !is_metadata_column(c))
            .cloned()
            .collect();
        let lookup = format!(
            "SELECT {flag} AS flag FROM {target} WHERE {pk} = ?",
            flag = quote_ident(IS_LOCALLY_EDITED),
            pk = quote_ident(&pk),
        );

        let now = self.now();
        let mut outcome = TableOutcome::default();
        for row in &rows {
            let key = match row.get(&pk) {
                Some(v) if *v != Value::Null => v.clone(),
                _ => {
                    tracing::warn!(
                        table = %table.table_name,
                        primary_key = %pk,
                        "skipping source row without primary key"
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };

            let existing = self.destination.query(&lookup, &[key.clone()])?;
            match existing.first() {
                None => {
                    let projected = row.project(&data_columns);
                    self.insert_row(
                        &target,
                        &projected,
                        vec![
                            (IS_LOCALLY_EDITED.to_string(), Value::Integer(0)),
                            (LAST_LOCAL_SYNC.to_string(), now.clone()),
                        ],
                    )?;
                    outcome.inserted += 1;
                }
                Some(found) if found.get_i64("flag").unwrap_or(0) != 0 => {
                    self.touch_last_sync(&target, &pk, Some(&key), &now)?;
                    outcome.preserved += 1;
                }
                Some(_) => {
                    self.update_row(&target, &pk, &key, &row.project(&data_columns), &now)?;
                    outcome.updated += 1;
                }
            }
        }
        Ok(outcome)
    }

    fn ensure_metadata_columns(&self, table: &TableDescriptor) -> Result<()> {
        let inspector = SchemaInspector::new(self.destination, &table.schema_name);
        let target = qualified(&table.schema_name, &table.table_name);
        let wanted = [
            (IS_LOCALLY_EDITED, "INTEGER NOT NULL DEFAULT 0"),
            (LAST_LOCAL_SYNC, "TEXT"),
        ];
        for (column, decl) in wanted {
            if inspector.has_column(&table.table_name, column)? {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {target} ADD COLUMN {} {decl}",
                quote_ident(column)
            );
            match self.destination.execute(&sql, &[]) {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn insert_row(
        &self,
        target: &str,
        row: &Row,
        extra: Vec<(String, Value)>,
    ) -> Result<()> {
        let mut names: Vec<String> = Vec::with_capacity(row.len() + extra.len());
        let mut values: Vec<Value> = Vec::with_capacity(row.len() + extra.len());
        for (name, value) in row.fields() {
            names.push(quote_ident(name));
            values.push(value.clone());
        }
        for (name, value) in extra {
            names.push(quote_ident(&name));
            values.push(value);
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {target} ({}) VALUES ({placeholders})",
            names.join(", ")
        );
        self.destination.execute(&sql, &values)?;
        Ok(())
    }

    fn update_row(
        &self,
        target: &str,
        pk: &str,
        key: &Value,
        row: &Row,
        now: &Value,
    ) -> Result<()> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        for (name, value) in row.fields() {
            if name == pk {
                continue;
            }
            sets.push(format!("{} = ?", quote_ident(name)));
            values.push(value.clone());
        }
        sets.push(format!("{} = ?", quote_ident(LAST_LOCAL_SYNC)));
        values.push(now.clone());
        values.push(key.clone());
        let sql = format!(
            "UPDATE {target} SET {} WHERE {} = ?",
            sets.join(", "),
            quote_ident(pk)
        );
        self.destination.execute(&sql, &values)?;
        Ok(())
    }

    fn touch_last_sync(
        &self,
        target: &str,
        pk: &str,
        key: Option<&Value>,
        now: &Value,
    ) -> Result<()> {
        let Some(key) = key else {
            return Ok(());
        };
        let sql = format!(
            "UPDATE {target} SET {} = ? WHERE {} = ?",
            quote_ident(LAST_LOCAL_SYNC),
            quote_ident(pk)
        );
        self.destination.execute(&sql, &[now.clone(), key.clone()])?;
        Ok(())
    }
}

fn is_metadata_column(name: &str) -> bool {
    name == IS_LOCALLY_EDITED || name == LAST_LOCAL_SYNC
}

fn value_key(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(b.iter().map(|x| format!("{x:02x}")).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rusqlite::Connection;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap()
    }

    fn stores() -> (Connection, Connection) {
        let source = Connection::open_in_memory().expect("source");
        let dest = Connection::open_in_memory().expect("dest");
        source
            .execute_batch(
                "CREATE TABLE tabel_siswa(id INTEGER PRIMARY KEY, nama TEXT, kelas TEXT, catatan_lama TEXT);
                 INSERT INTO tabel_siswa VALUES (1, 'Ani', 'X-1', 'a');
                 INSERT INTO tabel_siswa VALUES (2, 'Budi', 'X-1', 'b');
                 INSERT INTO tabel_siswa VALUES (3, 'Citra', 'X-2', 'c');
                 CREATE TABLE tabel_nilai(id INTEGER PRIMARY KEY, siswa_id INTEGER, nilai REAL, extra TEXT);
                 INSERT INTO tabel_nilai VALUES (10, 1, 88.5, 'x');
                 INSERT INTO tabel_nilai VALUES (11, 2, 70.0, 'y');",
            )
            .expect("seed source");
        dest.execute_batch(
            "CREATE TABLE tabel_siswa(id INTEGER PRIMARY KEY, nama TEXT, kelas TEXT);
             CREATE TABLE tabel_nilai(id INTEGER PRIMARY KEY, siswa_id INTEGER, nilai REAL);
             INSERT INTO tabel_nilai VALUES (99, 9, 1.0);",
        )
        .expect("seed dest");
        (source, dest)
    }

    fn table(name: &str) -> TableDescriptor {
        TableDescriptor::new("main", name)
    }

    fn dump(conn: &Connection, sql: &str) -> Vec<Vec<Value>> {
        let mut stmt = conn.prepare(sql).expect("prepare");
        let n = stmt.column_count();
        stmt.query_map([], |r| {
            (0..n)
                .map(|i| r.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })
            .and_then(|it| it.collect::<std::result::Result<Vec<_>, _>>())
            .expect("dump")
    }

    #[test]
    fn forced_replace_mirrors_source_and_drops_extra_columns() {
        let (source, dest) = stores();
        let sync = TableSynchronizer::new(&source, &dest).with_clock(fixed_clock);
        let outcome = sync.sync(&table("tabel_nilai")).expect("sync");
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(
            dump(&dest, "SELECT id, siswa_id, nilai FROM tabel_nilai ORDER BY id"),
            vec![
                vec![Value::Integer(10), Value::Integer(1), Value::Real(88.5)],
                vec![Value::Integer(11), Value::Integer(2), Value::Real(70.0)],
            ]
        );
    }

    #[test]
    fn forced_replace_is_idempotent() {
        let (source, dest) = stores();
        let sync = TableSynchronizer::new(&source, &dest).with_clock(fixed_clock);
        sync.sync(&table("tabel_nilai")).expect("first");
        let first = dump(&dest, "SELECT * FROM tabel_nilai ORDER BY id");
        let again = sync.sync(&table("tabel_nilai")).expect("second");
        assert_eq!(again.inserted, 2);
        assert_eq!(dump(&dest, "SELECT * FROM tabel_nilai ORDER BY id"), first);
    }

    #[test]
    fn forced_replace_of_empty_source_empties_destination() {
        let (source, dest) = stores();
        source.execute("DELETE FROM tabel_nilai", []).expect("clear");
        let outcome = TableSynchronizer::new(&source, &dest)
            .sync(&table("tabel_nilai"))
            .expect("sync");
        assert_eq!(outcome.record_count(), 0);
        assert_eq!(outcome.deleted, 1);
        assert!(dump(&dest, "SELECT * FROM tabel_nilai").is_empty());
    }

    #[test]
    fn forced_replace_keeps_locally_edited_rows() {
        let (source, dest) = stores();
        dest.execute_batch(
            "ALTER TABLE tabel_nilai ADD COLUMN is_locally_edited INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE tabel_nilai ADD COLUMN last_local_sync TEXT;
             INSERT INTO tabel_nilai VALUES (10, 1, 95.0, 1, NULL);",
        )
        .expect("flag");
        let outcome = TableSynchronizer::new(&source, &dest)
            .with_clock(fixed_clock)
            .sync(&table("tabel_nilai"))
            .expect("sync");
        assert_eq!(outcome.preserved, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(
            dump(&dest, "SELECT nilai, last_local_sync FROM tabel_nilai WHERE id = 10"),
            vec![vec![
                Value::Real(95.0),
                Value::Text("2026-01-15T08:00:00.000000Z".into())
            ]]
        );
    }

    #[test]
    fn missing_destination_table_is_an_error() {
        let (source, dest) = stores();
        source
            .execute_batch("CREATE TABLE tabel_guru(id INTEGER PRIMARY KEY, nama TEXT);")
            .expect("schema");
        let err = TableSynchronizer::new(&source, &dest)
            .sync(&table("tabel_guru"))
            .expect_err("missing table");
        assert!(matches!(err, SyncError::MissingTable { .. }));
    }

    #[test]
    fn selective_merge_respects_local_edits() {
        let (source, dest) = stores();
        dest.execute_batch(
            "ALTER TABLE tabel_siswa ADD COLUMN is_locally_edited INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE tabel_siswa ADD COLUMN last_local_sync TEXT;
             INSERT INTO tabel_siswa VALUES (1, 'Ani Lama', 'IX', 0, '2020-01-01T00:00:00Z');
             INSERT INTO tabel_siswa VALUES (2, 'Budi Diedit', 'X-9', 1, '2020-01-01T00:00:00Z');",
        )
        .expect("seed");

        let outcome = TableSynchronizer::new(&source, &dest)
            .with_clock(fixed_clock)
            .sync(&table("tabel_siswa"))
            .expect("sync");
        assert_eq!(
            outcome,
            TableOutcome {
                inserted: 1,
                updated: 1,
                preserved: 1,
                skipped: 0,
                deleted: 0
            }
        );

        let stamp = Value::Text("2026-01-15T08:00:00.000000Z".into());
        assert_eq!(
            dump(
                &dest,
                "SELECT id, nama, kelas, is_locally_edited, last_local_sync FROM tabel_siswa ORDER BY id"
            ),
            vec![
                vec![
                    Value::Integer(1),
                    Value::Text("Ani".into()),
                    Value::Text("X-1".into()),
                    Value::Integer(0),
                    stamp.clone()
                ],
                vec![
                    Value::Integer(2),
                    Value::Text("Budi Diedit".into()),
                    Value::Text("X-9".into()),
                    Value::Integer(1),
                    stamp.clone()
                ],
                vec![
                    Value::Integer(3),
                    Value::Text("Citra".into()),
                    Value::Text("X-2".into()),
                    Value::Integer(0),
                    stamp
                ],
            ]
        );
    }

    #[test]
    fn selective_merge_adds_metadata_columns_once() {
        let (source, dest) = stores();
        let sync = TableSynchronizer::new(&source, &dest).with_clock(fixed_clock);
        sync.sync(&table("tabel_siswa")).expect("first");
        let second = sync.sync(&table("tabel_siswa")).expect("second");
        assert_eq!(second.updated, 3);
        let inspector = SchemaInspector::new(&dest, "main");
        let columns = inspector.columns("tabel_siswa").expect("columns");
        assert_eq!(
            columns,
            vec!["id", "nama", "kelas", "is_locally_edited", "last_local_sync"]
        );
    }

    #[test]
    fn selective_merge_skips_rows_without_key() {
        let source = Connection::open_in_memory().expect("source");
        let dest = Connection::open_in_memory().expect("dest");
        source
            .execute_batch(
                "CREATE TABLE tabel_siswa_pelengkap(nis TEXT, alamat TEXT);
                 INSERT INTO tabel_siswa_pelengkap VALUES ('001', 'Jl. Mawar');
                 INSERT INTO tabel_siswa_pelengkap VALUES (NULL, 'Jl. Melati');",
            )
            .expect("source");
        dest.execute_batch("CREATE TABLE tabel_siswa_pelengkap(nis TEXT PRIMARY KEY, alamat TEXT);")
            .expect("dest");
        let outcome = TableSynchronizer::new(&source, &dest)
            .sync(&table("tabel_siswa_pelengkap"))
            .expect("sync");
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 1);
    }
}

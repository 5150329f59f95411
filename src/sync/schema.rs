use rusqlite::types::Value;

use super::executor::QueryExecutor;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Live catalog introspection for one store. Nothing is cached: every call
/// re-reads `pragma_table_info`.
pub struct SchemaInspector<'a> {
    exec: &'a dyn QueryExecutor,
    schema: &'a str,
}

#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    pk: i64,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(exec: &'a dyn QueryExecutor, schema: &'a str) -> Self {
        Self { exec, schema }
    }

    fn table_info(&self, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
        let rows = self.exec.query(
            "SELECT name, pk FROM pragma_table_info(?, ?) ORDER BY cid",
            &[
                Value::Text(table.to_string()),
                Value::Text(self.schema.to_string()),
            ],
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(ColumnInfo {
                    name: r.get_text("name")?,
                    pk: r.get_i64("pk").unwrap_or(0),
                })
            })
            .collect())
    }

    /// Column names in physical order. Empty when the table does not exist.
    pub fn columns(&self, table: &str) -> rusqlite::Result<Vec<String>> {
        Ok(self.table_info(table)?.into_iter().map(|c| c.name).collect())
    }

    pub fn has_column(&self, table: &str, column: &str) -> rusqlite::Result<bool> {
        Ok(self.table_info(table)?.iter().any(|c| c.name == column))
    }

    /// First declared primary-key column, or `"id"` when the table declares none.
    pub fn primary_key(&self, table: &str) -> rusqlite::Result<String> {
        let info = self.table_info(table)?;
        let pk = info
            .iter()
            .filter(|c| c.pk > 0)
            .min_by_key(|c| c.pk)
            .map(|c| c.name.clone());
        match pk {
            Some(name) => Ok(name),
            None => {
                tracing::warn!(
                    schema = self.schema,
                    table,
                    "no primary key declared, assuming \"{}\"",
                    DEFAULT_PRIMARY_KEY
                );
                Ok(DEFAULT_PRIMARY_KEY.to_string())
            }
        }
    }

    /// User tables in this schema, sorted by name.
    pub fn tables(&self) -> rusqlite::Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
            super::executor::quote_ident(self.schema)
        );
        Ok(self
            .exec
            .query(&sql, &[])?
            .into_iter()
            .filter_map(|r| r.get_text("name"))
            .collect())
    }
}

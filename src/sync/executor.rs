use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// One result row: column names in select order, paired with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keeps only the columns present in `allowed`, preserving this row's order.
    pub fn project(&self, allowed: &[String]) -> Row {
        Row {
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| allowed.iter().any(|a| a == name))
                .cloned()
                .collect(),
        }
    }

    pub fn get_text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Blob(_) => None,
        }
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Parameterized statement execution against one relational store.
pub trait QueryExecutor {
    fn query(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>>;
    fn execute(&self, sql: &str, params: &[Value]) -> rusqlite::Result<usize>;
}

impl QueryExecutor for Connection {
    fn query(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.prepare_cached(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                fields.push((name.clone(), row.get::<_, Value>(i)?));
            }
            out.push(Row::new(fields));
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> rusqlite::Result<usize> {
        let mut stmt = self.prepare_cached(sql)?;
        stmt.execute(params_from_iter(params.iter()))
    }
}

/// Quotes an SQL identifier (`"name"`), doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

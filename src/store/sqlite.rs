//! Embedded single-file SQLite backend.

use std::path::PathBuf;

use rusqlite::{ffi, Connection};

use super::{QueryOutput, SqlBackend, SqlValue, StorageError, SCHEMA_TABLES};

pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Opens (and immediately releases) one connection so an unusable path
    /// fails at initialization rather than on the first operation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let backend = Self { db_path: path.into() };
        backend.connect()?;
        Ok(backend)
    }

    // One fresh connection per logical operation, released on every exit
    // path when it drops. SQLite leaves foreign keys off per connection,
    // so the pragma has to be applied each time.
    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(conn)
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value, ValueRef};
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl From<rusqlite::types::ValueRef<'_>> for SqlValue {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(v) | ValueRef::Blob(v) => {
                SqlValue::Text(String::from_utf8_lossy(v).into_owned())
            }
        }
    }
}

fn classify(err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(code, ref message) = err {
        let detail = message.clone().unwrap_or_else(|| code.to_string());
        match code.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                return StorageError::DuplicateKey(detail)
            }
            // RESTRICT actions surface through SQLite's internal trigger
            // programs, not the plain foreign-key code.
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY | ffi::SQLITE_CONSTRAINT_TRIGGER => {
                return StorageError::ForeignKeyViolation(detail)
            }
            _ => {}
        }
    }
    StorageError::Sqlite(err)
}

impl SqlBackend for SqliteBackend {
    fn ensure_schema(&self) -> Result<(), StorageError> {
        let conn = self.connect()?;
        for ddl in SCHEMA_TABLES {
            conn.execute_batch(ddl)?;
        }
        Ok(())
    }

    fn insert(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        let conn = self.connect()?;
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        conn.execute(&sql, rusqlite::params_from_iter(fields.iter().map(|(_, v)| v)))
            .map_err(classify)?;
        Ok(())
    }

    fn update(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        if fields.len() < 2 {
            return Ok(());
        }
        let (id_column, id_value) = &fields[0];
        let rest = &fields[1..];

        let conn = self.connect()?;
        let assignments: Vec<String> = rest.iter().map(|(c, _)| format!("{c} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table,
            assignments.join(", "),
            id_column
        );
        let params = rusqlite::params_from_iter(
            rest.iter().map(|(_, v)| v).chain(std::iter::once(id_value)),
        );
        conn.execute(&sql, params).map_err(classify)?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<QueryOutput, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut rows = stmt.query([])?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                cells.push(SqlValue::from(row.get_ref(idx)?));
            }
            data.push(cells);
        }
        Ok(QueryOutput { columns, rows: data })
    }

    fn execute(&self, sql: &str) -> Result<(), StorageError> {
        let conn = self.connect()?;
        conn.execute_batch(sql).map_err(classify)?;
        Ok(())
    }
}

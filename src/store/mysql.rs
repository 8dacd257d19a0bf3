//! Networked MySQL backend.

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Pool};

use super::{QueryOutput, SqlBackend, SqlValue, StorageError, SCHEMA_TABLES};
use crate::config::MySqlParams;

const ER_DUP_ENTRY: u16 = 1062;
const ER_ROW_IS_REFERENCED: u16 = 1451;
const ER_NO_REFERENCED_ROW: u16 = 1452;

pub struct MySqlBackend {
    pool: Pool,
}

impl MySqlBackend {
    /// Connects to the server, creates the target schema if absent, and
    /// switches the pool into it. Bad parameters or an unreachable server
    /// fail here.
    pub fn connect(params: &MySqlParams) -> Result<Self, StorageError> {
        // The schema may not exist yet, so bootstrap without one selected.
        let mut bootstrap = Conn::new(server_opts(params))?;
        bootstrap.query_drop(format!("CREATE DATABASE IF NOT EXISTS {}", params.schema))?;

        let pool = Pool::new(server_opts(params).db_name(Some(params.schema.clone())))?;
        Ok(Self { pool })
    }
}

fn server_opts(params: &MySqlParams) -> OptsBuilder {
    OptsBuilder::new()
        .ip_or_hostname(Some(params.host.clone()))
        .tcp_port(params.port)
        .user(Some(params.user.clone()))
        .pass(Some(params.password.clone()))
}

impl From<SqlValue> for mysql::Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => mysql::Value::NULL,
            SqlValue::Integer(v) => mysql::Value::Int(v),
            SqlValue::Real(v) => mysql::Value::Double(v),
            SqlValue::Text(v) => mysql::Value::Bytes(v.into_bytes()),
        }
    }
}

impl From<mysql::Value> for SqlValue {
    fn from(value: mysql::Value) -> Self {
        match value {
            mysql::Value::NULL => SqlValue::Null,
            mysql::Value::Bytes(bytes) => {
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            mysql::Value::Int(v) => SqlValue::Integer(v),
            mysql::Value::UInt(v) => SqlValue::Integer(v as i64),
            mysql::Value::Float(v) => SqlValue::Real(v as f64),
            mysql::Value::Double(v) => SqlValue::Real(v),
            mysql::Value::Date(y, mo, d, h, mi, s, _) => SqlValue::Text(format!(
                "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"
            )),
            mysql::Value::Time(neg, days, h, m, s, _) => {
                let hours = u32::from(h) + days * 24;
                let sign = if neg { "-" } else { "" };
                SqlValue::Text(format!("{sign}{hours:02}:{m:02}:{s:02}"))
            }
        }
    }
}

fn classify(err: mysql::Error) -> StorageError {
    if let mysql::Error::MySqlError(ref server) = err {
        match server.code {
            ER_DUP_ENTRY => return StorageError::DuplicateKey(server.message.clone()),
            ER_ROW_IS_REFERENCED | ER_NO_REFERENCED_ROW => {
                return StorageError::ForeignKeyViolation(server.message.clone())
            }
            _ => {}
        }
    }
    StorageError::MySql(err)
}

impl SqlBackend for MySqlBackend {
    fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.get_conn()?;
        for ddl in SCHEMA_TABLES {
            conn.query_drop(ddl)?;
        }
        Ok(())
    }

    fn insert(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        let mut conn = self.pool.get_conn()?;
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        let values: Vec<mysql::Value> = fields.iter().map(|(_, v)| v.clone().into()).collect();
        conn.exec_drop(sql, values).map_err(classify)?;
        Ok(())
    }

    fn update(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        if fields.len() < 2 {
            return Ok(());
        }
        let (id_column, id_value) = &fields[0];
        let rest = &fields[1..];

        let mut conn = self.pool.get_conn()?;
        let assignments: Vec<String> = rest.iter().map(|(c, _)| format!("{c} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table,
            assignments.join(", "),
            id_column
        );
        let values: Vec<mysql::Value> = rest
            .iter()
            .map(|(_, v)| v.clone().into())
            .chain(std::iter::once(id_value.clone().into()))
            .collect();
        conn.exec_drop(sql, values).map_err(classify)?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<QueryOutput, StorageError> {
        let mut conn = self.pool.get_conn()?;
        let mut result = conn.query_iter(sql).map_err(classify)?;
        let columns: Vec<String> = result
            .columns()
            .as_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();

        let mut data = Vec::new();
        for row in result.by_ref() {
            let row = row.map_err(classify)?;
            data.push(row.unwrap().into_iter().map(SqlValue::from).collect());
        }
        Ok(QueryOutput { columns, rows: data })
    }

    fn execute(&self, sql: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.get_conn()?;
        conn.query_drop(sql).map_err(classify)?;
        Ok(())
    }
}

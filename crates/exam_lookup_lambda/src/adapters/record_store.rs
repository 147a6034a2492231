use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use exam_lookup_core::contract::{LookupKey, LookupValue, Record, Table};
use exam_lookup_core::lookup::{RecordStore, StoreError};
use exam_lookup_core::sql::{count_statement, select_statement};
use serde_json::Value;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Row, TypeInfo};
use tracing::{debug, warn};

use crate::config::Config;

/// MySQL-backed [`RecordStore`].
///
/// Every query acquires a pooled connection for its own duration. The
/// connection goes back to the pool when the guard drops, so early returns and
/// errors release it the same way success does.
#[derive(Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Builds the pool without connecting; the first query opens the first
    /// connection, bounded by the configured connect timeout.
    pub fn connect_lazy(config: &Config) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.database_host)
            .port(config.database_port)
            .username(&config.database_user)
            .password(&config.database_password)
            .database(&config.database_name);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(config.database_connect_timeout.0)
            .connect_lazy_with(options);

        Self::new(pool)
    }

    async fn run(&self, statement: &str, key: &LookupKey) -> Result<Vec<MySqlRow>, StoreError> {
        let mut connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| StoreError::Connection(Box::new(error)))?;

        debug!(statement, field = %key.field, "executing lookup query");
        bind_value(sqlx::query(statement), &key.value)
            .fetch_all(&mut *connection)
            .await
            .map_err(|error| StoreError::Query(Box::new(error)))
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn count_matching(&self, table: Table, key: &LookupKey) -> Result<u64, StoreError> {
        let statement = count_statement(table, key.field);
        let rows = self.run(&statement, key).await?;

        let Some(row) = rows.first() else {
            return Ok(0);
        };
        let count: i64 = row.try_get("count").map_err(|error| StoreError::Decode {
            column: "count".to_string(),
            source: Box::new(error),
        })?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_matching(
        &self,
        table: Table,
        key: &LookupKey,
    ) -> Result<Vec<Record>, StoreError> {
        let statement = select_statement(table, key.field);
        let rows = self.run(&statement, key).await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q LookupValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        LookupValue::Text(text) => query.bind(text.as_str()),
        LookupValue::Integer(integer) => query.bind(*integer),
        LookupValue::Float(float) => query.bind(*float),
    }
}

fn row_to_record(row: &MySqlRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for column in row.columns() {
        let name = column.name();
        let value = column_value(row, column.ordinal(), column.type_info().name()).map_err(
            |error| StoreError::Decode {
                column: name.to_string(),
                source: Box::new(error),
            },
        )?;
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

/// Converts one column to JSON by its MySQL type name.
fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "NULL" => Value::Null,
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        "YEAR" => row
            .try_get_unchecked::<Option<u64>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        // DECIMAL travels as text on the wire; keep it as a string so no
        // precision is lost.
        "DECIMAL" => row
            .try_get_unchecked::<Option<String>, _>(index)?
            .map(Value::from)
            .unwrap_or_default(),
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<Option<String>, _>(index)?
                .map(Value::from)
                .unwrap_or_default()
        }
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|date| Value::from(date.to_string()))
            .unwrap_or_default(),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|datetime| Value::from(datetime.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or_default(),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|timestamp| Value::from(timestamp.to_rfc3339()))
            .unwrap_or_default(),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|time| Value::from(time.to_string()))
            .unwrap_or_default(),
        "JSON" => row
            .try_get::<Option<Json<Value>>, _>(index)?
            .map(|json| json.0)
            .unwrap_or_default(),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)?
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or_default(),
        other => {
            warn!(column_type = other, "unsupported column type, emitting null");
            Value::Null
        }
    };
    Ok(value)
}

//! `sql` activity: run a query against Postgres or MySQL.

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use serde_json::{json, Value};
use sqlx::{Column, Connection, Row, TypeInfo};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct SqlHandler;

fn connection_string(config: &Value) -> Result<&str, FlowError> {
    config
        .get("dsn")
        .and_then(Value::as_str)
        .or_else(|| config.get("connection_string").and_then(Value::as_str))
        .ok_or_else(|| FlowError::config("sql node requires `dsn` or `connection_string`"))
}

fn pg_row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name().to_owned();
        let value = match column.type_info().name() {
            "INT4" | "INT8" | "INT2" => row
                .try_get::<i64, _>(column.ordinal())
                .map_or(Value::Null, |v| json!(v)),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => row
                .try_get::<f64, _>(column.ordinal())
                .map_or(Value::Null, |v| json!(v)),
            "BOOL" => row
                .try_get::<bool, _>(column.ordinal())
                .map_or(Value::Null, |v| json!(v)),
            _ => row
                .try_get::<String, _>(column.ordinal())
                .map_or(Value::Null, Value::String),
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

fn mysql_row_to_json(row: &sqlx::mysql::MySqlRow) -> Value {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name().to_owned();
        let value = match column.type_info().name() {
            "TINYINT" | "SMALLINT" | "INT" | "BIGINT" => row
                .try_get::<i64, _>(column.ordinal())
                .map_or(Value::Null, |v| json!(v)),
            "FLOAT" | "DOUBLE" | "DECIMAL" => row
                .try_get::<f64, _>(column.ordinal())
                .map_or(Value::Null, |v| json!(v)),
            _ => row
                .try_get::<String, _>(column.ordinal())
                .map_or(Value::Null, Value::String),
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

#[async_trait]
impl ActivityHandler for SqlHandler {
    fn activity_type(&self) -> &'static str {
        "sql"
    }

    async fn execute(
        &self,
        _input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let engine = config
            .get("engine")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("sql node requires `engine`"))?;
        let query = config
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("sql node requires `query`"))?;
        let dsn = connection_string(config)?;

        let rows = match engine {
            "postgres" => {
                let mut conn = sqlx::PgConnection::connect(dsn)
                    .await
                    .map_err(|e| FlowError::activity(format!("postgres connect failed: {e}")))?;
                sqlx::query(query)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| FlowError::activity(format!("query failed: {e}")))?
                    .iter()
                    .map(pg_row_to_json)
                    .collect::<Vec<_>>()
            }
            "mysql" => {
                let mut conn = sqlx::MySqlConnection::connect(dsn)
                    .await
                    .map_err(|e| FlowError::activity(format!("mysql connect failed: {e}")))?;
                sqlx::query(query)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| FlowError::activity(format!("query failed: {e}")))?
                    .iter()
                    .map(mysql_row_to_json)
                    .collect::<Vec<_>>()
            }
            other => {
                return Err(FlowError::config(format!(
                    "unsupported sql engine `{other}`, expected `postgres` or `mysql`"
                )))
            }
        };

        Ok(json!({ "rows": rows }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[tokio::test]
    async fn missing_query_is_a_config_error() {
        let handler = SqlHandler;
        let config = json!({"engine": "postgres", "dsn": "postgres://x"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn unsupported_engine_is_a_config_error() {
        let handler = SqlHandler;
        let config = json!({"engine": "oracle", "query": "select 1", "dsn": "x"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }
}

//! `sql_query` skills: a parameterized statement against a SQLite store.
//!
//! `config.statement` uses `?` placeholders bound, in order, from the inputs
//! named in `config.params`. Rows come back as JSON objects keyed by column
//! name under `config.result_field` (default `items`), alongside
//! `total_count`. Pools are opened lazily and cached per database URL.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::{into_output, parse_config, use_mock};
use crate::workspace::resolve_env_placeholder;

const MAX_CONNECTIONS: u32 = 4;

fn default_result_field() -> String {
    "items".to_string()
}

#[derive(Debug, Deserialize)]
struct SqlQueryConfig {
    #[serde(default)]
    database_url: Option<String>,
    statement: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default = "default_result_field")]
    result_field: String,
}

#[derive(Debug)]
pub struct SqlQueryExecutor {
    mock_mode: bool,
    default_url: Option<String>,
    pools: Mutex<HashMap<String, SqlitePool>>,
}

impl SqlQueryExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        Self {
            mock_mode: settings.mock_mode,
            default_url: settings.database_url.clone(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn pool(&self, url: &str) -> Result<SqlitePool, ExecutorError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(url) {
            return Ok(pool.clone());
        }
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ExecutorError::Config(format!("invalid database URL '{url}': {e}")))?
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| ExecutorError::Backend(format!("failed to open '{url}': {e}")))?;
        tracing::debug!(%url, "opened SQL pool");
        pools.insert(url.to_string(), pool.clone());
        Ok(pool)
    }
}

impl SkillExecutor for SqlQueryExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::SqlQuery
    }

    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        if use_mock(self.mock_mode, skill) {
            return Ok(mock_output(inputs));
        }

        let config: SqlQueryConfig = parse_config(skill)?;
        let url = config
            .database_url
            .as_deref()
            .map(resolve_env_placeholder)
            .or_else(|| self.default_url.clone())
            .ok_or_else(|| {
                ExecutorError::Config(format!(
                    "skill '{}' has no config.database_url and no executors.database_url is set",
                    skill.skill_id
                ))
            })?;
        let pool = self.pool(&url).await?;

        let mut query = sqlx::query(&config.statement);
        for param in &config.params {
            query = bind_json(query, inputs.get(param));
        }
        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(|e| ExecutorError::Backend(format!("query failed: {e}")))?;
        let items = rows
            .iter()
            .map(row_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExecutorError::MalformedResponse(format!("unreadable row: {e}")))?;

        tracing::info!(skill_id = %skill.skill_id, rows = items.len(), "SQL query completed");
        let mut output = ValueMap::new();
        output.insert("total_count".to_string(), json!(items.len()));
        output.insert(config.result_field, Value::Array(items));
        Ok(output)
    }
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Value::Null) => query.bind(None::<String>),
        Some(Value::Bool(b)) => query.bind(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Some(Value::String(s)) => query.bind(s.clone()),
        Some(other) => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Value, sqlx::Error> {
    let mut map = ValueMap::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let storage = (!raw.is_null()).then(|| raw.type_info().name().to_string());
        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => json!(row.try_get::<i64, _>(idx)?),
            Some("REAL") => json!(row.try_get::<f64, _>(idx)?),
            Some("BOOLEAN") => json!(row.try_get::<bool, _>(idx)?),
            Some("BLOB") => {
                let bytes: Vec<u8> = row.try_get(idx)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(_) => Value::String(row.try_get::<String, _>(idx)?),
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(map))
}

fn mock_output(inputs: &ValueMap) -> ValueMap {
    let location = inputs
        .get("location")
        .and_then(Value::as_str)
        .unwrap_or("Miami");
    into_output(json!({
        "items": [
            {
                "id": "stay_1",
                "name": format!("Beautiful Home in {location}"),
                "location": format!("{location}, FL"),
                "pricePerNight": 189.0,
                "rating": 4.7,
                "highlights": ["3 bedrooms", "Up to 6 guests", "House"],
                "source": "lakehouse",
                "reviewCount": 23,
            },
            {
                "id": "stay_2",
                "name": format!("Cozy Apartment in {location}"),
                "location": format!("{location}, FL"),
                "pricePerNight": 129.0,
                "rating": 4.5,
                "highlights": ["1 bedroom", "Up to 3 guests", "Apartment"],
                "source": "lakehouse",
                "reviewCount": 15,
            },
        ],
        "total_count": 2,
    }))
}

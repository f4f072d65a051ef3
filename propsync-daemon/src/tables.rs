//! Reference tables read from MySQL.
//!
//! Each tracked table becomes one JSON object keyed by the table's key
//! column, one row object per key. Columns of an unsupported type (DECIMAL,
//! TIME) must be cast to CHAR in the table query.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo};

use propsync_core::settings::{CredentialKeys, TableSpec};
use propsync_core::{ConfigAuthority, NamespaceIds, Stage};
use propsync_snapshot::properties::{self, Properties};

use crate::error::DaemonError;

/// Current contents of a tracked table.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_table(&self, table: &TableSpec) -> Result<Value, DaemonError>;
}

pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Build a lazily connecting pool; connection errors surface on the first
    /// query.
    pub fn new(options: MySqlConnectOptions) -> Self {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);
        Self { pool }
    }

    pub fn from_url(url: &str) -> Result<Self, DaemonError> {
        Ok(Self::new(url.parse::<MySqlConnectOptions>()?))
    }
}

#[async_trait]
impl ReferenceSource for MySqlSource {
    async fn fetch_table(&self, table: &TableSpec) -> Result<Value, DaemonError> {
        let rows = sqlx::query(&table.query).fetch_all(&self.pool).await?;
        let objects = rows
            .iter()
            .map(row_to_object)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(table = %table.name, rows = objects.len(), "table fetched");
        Ok(rows_by_key(objects, &table.key_column))
    }
}

fn row_to_object(row: &MySqlRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column.type_info().name())?;
        object.insert(column.name().to_owned(), value);
    }
    Ok(object)
}

fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get::<Option<i64>, _>(index)?.map(Value::from)
        }
        t if t.ends_with("UNSIGNED") => row.try_get::<Option<u64>, _>(index)?.map(Value::from),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|f| Value::from(f64::from(f))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|t| Value::from(t.format("%Y-%m-%d %H:%M:%S").to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(|d| Value::from(d.to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|b| Value::from(String::from_utf8_lossy(&b).into_owned())),
        _ => row.try_get::<Option<String>, _>(index)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Key rows by `key_column`. Rows without the column are dropped; a
/// repeated key keeps the last row.
pub fn rows_by_key(rows: Vec<Map<String, Value>>, key_column: &str) -> Value {
    let mut keyed = Map::new();
    for row in rows {
        let key = match row.get(key_column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                tracing::warn!(key_column, "row without key dropped");
                continue;
            }
            Some(other) => other.to_string(),
        };
        keyed.insert(key, Value::Object(row));
    }
    Value::Object(keyed)
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl DatabaseCredentials {
    pub fn from_properties(props: &Properties, keys: &CredentialKeys) -> Result<Self, DaemonError> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim().to_owned())
                .ok_or_else(|| DaemonError::MissingCredential {
                    key: key.to_owned(),
                })
        };
        let port = get(&keys.port)?;
        Ok(Self {
            host: get(&keys.host)?,
            port: port.parse().map_err(|_| DaemonError::InvalidCredential {
                key: keys.port.clone(),
                value: port.clone(),
            })?,
            user: get(&keys.user)?,
            password: get(&keys.password)?,
            database: get(&keys.database)?,
        })
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

/// Read credentials from the shared properties of `stage` on the authority.
pub fn load_credentials(
    authority: &dyn ConfigAuthority,
    ids: &NamespaceIds,
    stage: Stage,
    keys: &CredentialKeys,
) -> Result<DatabaseCredentials, DaemonError> {
    let tenant = ids.id_of(stage.as_str());
    let text = authority
        .get_config(tenant, &keys.group, &keys.data_id)?
        .unwrap_or_default();
    DatabaseCredentials::from_properties(&properties::parse(&text), keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use propsync_remote::InMemoryAuthority;
    use serde_json::json;

    const COMMON: &str = "\
cloud.service.database.host = db.ci
cloud.service.database.port = 3306
cloud.service.database.user = loader
cloud.service.database.password = s3cret
cloud.service.database.name = vesync_main
";

    #[test]
    fn credentials_come_from_stage_common_properties() {
        let authority = InMemoryAuthority::default();
        authority.set("env-01", "SHARED", "common", COMMON);

        let creds = load_credentials(
            &authority,
            &NamespaceIds::default(),
            Stage::Ci,
            &CredentialKeys::default(),
        )
        .unwrap();
        assert_eq!(creds.host, "db.ci");
        assert_eq!(creds.port, 3306);
        assert_eq!(creds.database, "vesync_main");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn missing_or_bad_credentials_are_configuration_errors() {
        let keys = CredentialKeys::default();
        let err = DatabaseCredentials::from_properties(&properties::parse(""), &keys).unwrap_err();
        assert!(matches!(err, DaemonError::MissingCredential { ref key } if key == &keys.port));

        let bad = COMMON.replace("3306", "mysql");
        let err = DatabaseCredentials::from_properties(&properties::parse(&bad), &keys).unwrap_err();
        assert!(matches!(err, DaemonError::InvalidCredential { .. }));
    }

    #[test]
    fn rows_are_keyed_by_column() {
        let rows = vec![
            json!({"config_module": "core400s", "firmware_version": "1.0"}),
            json!({"config_module": 42, "firmware_version": "2.0"}),
            json!({"firmware_version": "orphan"}),
            json!({"config_module": "core400s", "firmware_version": "1.1"}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        })
        .collect();

        let keyed = rows_by_key(rows, "config_module");
        assert_eq!(
            keyed,
            json!({
                "core400s": {"config_module": "core400s", "firmware_version": "1.1"},
                "42": {"config_module": 42, "firmware_version": "2.0"}
            })
        );
    }
}

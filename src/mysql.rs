use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use figment::providers::Env;
use figment::Figment;
use futures::TryStreamExt;
use serde::{Deserialize, Deserializer};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::database::{Database, ExecuteResult};
use crate::ddl;
use crate::error::Result;
use crate::query::{Dialect, SqlQuery};
use crate::value::{Row, Value};

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_POOL_SIZE: u32 = 10;
/// Extra connections allowed beyond the pool size, as a multiple of it.
pub const MAX_OVERFLOW_RATIO: u32 = 2;

const ENV_PREFIX: &str = "MYSQL_";

/// MySQL connection settings, usually read from `MYSQL_*` variables.
#[derive(Clone, PartialEq, Deserialize)]
pub struct MySqlConfig {
    #[serde(deserialize_with = "lenient_string")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(deserialize_with = "lenient_string")]
    pub database: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub password: Option<String>,
    /// Used when no `user` is configured, connecting as `root`.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub root_password: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

// Env values that look numeric arrive as numbers; credentials stay strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Text(s) => s,
            Scalar::Signed(i) => i.to_string(),
            Scalar::Unsigned(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Scalar::deserialize(d).map(Into::into)
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Into::into))
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |p: &Option<String>| p.as_ref().map(|_| "***");
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("root_password", &redact(&self.root_password))
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl MySqlConfig {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            database: database.into(),
            user: None,
            password: None,
            root_password: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn root_password(mut self, password: impl Into<String>) -> Self {
        self.root_password = Some(password.into());
        self
    }

    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Provider chain for `MYSQL_*` environment variables.
    pub fn figment() -> Figment {
        Figment::new().merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load `.env` when present, then read `MYSQL_*` variables.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Ok(Self::figment().extract()?)
    }

    /// Username and password to connect with: the configured user, or
    /// `root` with the root password.
    pub fn credentials(&self) -> (&str, Option<&str>) {
        match &self.user {
            Some(user) => (user, self.password.as_deref()),
            None => ("root", self.root_password.as_deref()),
        }
    }

    pub fn max_connections(&self) -> u32 {
        self.pool_size.max(1).saturating_mul(1 + MAX_OVERFLOW_RATIO)
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let (user, password) = self.credentials();
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(user);
        match password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    pub fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .min_connections(self.pool_size.max(1))
            .max_connections(self.max_connections())
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// MySQL database reached through a connection pool.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    /// Build the pool and open its first connection.
    pub async fn connect(config: &MySqlConfig) -> Result<Self> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options())
            .await?;
        debug!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections(),
            "connected to mysql"
        );
        Ok(Self { pool })
    }

    /// Build the pool without connecting; connections open on first use.
    pub fn connect_lazy(config: &MySqlConfig) -> Self {
        let pool = config
            .pool_options()
            .connect_lazy_with(config.connect_options());
        Self { pool }
    }

    pub async fn from_env() -> Result<Self> {
        Self::connect(&MySqlConfig::from_env()?).await
    }

    /// The driver pool, for queries the helpers don't cover.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Run every `.sql` script under `dir`, returning how many ran.
    pub async fn apply_ddl(&self, dir: &Path) -> Result<usize> {
        let scripts = ddl::discover(dir)?;
        for script in &scripts {
            debug!(script = %script.display(), "loading DDL");
            let sql = ddl::load(script)?;
            sqlx::raw_sql(&sql).execute(&self.pool).await?;
        }
        Ok(scripts.len())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
        Value::Boolean(b) => query.bind(*b),
    }
}

fn bind_all<'q>(statement: &'q str, params: &[Value]) -> MySqlQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(statement), |q, v| bind_value(q, v))
}

fn decode_row(row: &MySqlRow) -> Result<Row> {
    (0..row.columns().len())
        .map(|i| decode_column(row, i))
        .collect()
}

fn decode_column(row: &MySqlRow, i: usize) -> Result<Value> {
    let type_name = {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Boolean(row.try_get(i)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Value::Integer(row.try_get(i)?),
        "YEAR" => Value::Integer(row.try_get_unchecked(i)?),
        name if name.ends_with("UNSIGNED") => {
            let v: u64 = row.try_get(i)?;
            i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Integer)
        }
        "FLOAT" => Value::Real(f64::from(row.try_get::<f32, _>(i)?)),
        "DOUBLE" => Value::Real(row.try_get(i)?),
        "DATETIME" | "TIMESTAMP" => Value::Text(row.try_get::<NaiveDateTime, _>(i)?.to_string()),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(i)?.to_string()),
        "TIME" => Value::Text(row.try_get::<NaiveTime, _>(i)?.to_string()),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::Blob(row.try_get_unchecked(i)?),
        // DECIMAL, text, ENUM, SET and JSON all arrive as UTF-8 text.
        _ => match row.try_get_unchecked::<String, _>(i) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Blob(row.try_get_unchecked(i)?),
        },
    };
    Ok(value)
}

#[async_trait]
impl Database for MySqlDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn execute(&self, query: SqlQuery) -> Result<ExecuteResult> {
        let mut tx = self.pool.begin().await?;
        let result = bind_all(&query.statement, &query.params)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id != 0),
        })
    }

    async fn fetch(&self, query: SqlQuery) -> Result<Vec<Row>> {
        let mut conn = self.pool.acquire().await?;
        let mut stream = bind_all(&query.statement, &query.params).fetch(&mut *conn);
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(decode_row(&row)?);
        }
        Ok(rows)
    }
}

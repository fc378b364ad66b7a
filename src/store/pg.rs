//! PostgreSQL backend: one pooled connection checked out per call.

use crate::config::{float_value, ResolvedEntity};
use crate::error::StoreError;
use crate::sql::{self, PgBindValue, QueryBuf, QueryPlan};
use crate::store::{Backend, Row};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    schema: String,
}

impl PgBackend {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgBackend {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(
        database_url: &str,
        schema: impl Into<String>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Scoped connection; returned to the pool when dropped on any exit path.
    async fn conn(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    fn bind_all<'q>(
        q: &'q QueryBuf,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn select(&self, entity: &ResolvedEntity, plan: &QueryPlan) -> Result<Vec<Row>, StoreError> {
        let q = sql::select(entity, plan, &self.schema);
        let mut conn = self.conn().await?;
        let rows = Self::bind_all(&q).fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn insert(&self, entity: &ResolvedEntity, values: &Row) -> Result<i64, StoreError> {
        let q = sql::insert(entity, values, &self.schema);
        let mut conn = self.conn().await?;
        let row = Self::bind_all(&q).fetch_one(&mut *conn).await?;
        key_of(&row, &entity.pk)
    }

    async fn update(&self, entity: &ResolvedEntity, id: i64, values: &Row) -> Result<bool, StoreError> {
        let q = sql::update(entity, id, values, &self.schema);
        let mut conn = self.conn().await?;
        let row = Self::bind_all(&q).fetch_optional(&mut *conn).await?;
        Ok(row.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query("SELECT 1").fetch_optional(&mut *conn).await?;
        Ok(())
    }
}

fn key_of(row: &PgRow, pk: &str) -> Result<i64, StoreError> {
    use sqlx::Row;
    if let Ok(v) = row.try_get::<i64, _>(pk) {
        return Ok(v);
    }
    Ok(row.try_get::<i32, _>(pk).map(i64::from)?)
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return float_value(n as f64);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return float_value(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Create the database named in `database_url` if it does not exist yet.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL has no database path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut parts = path_and_query.splitn(2, '?');
    let db_name = parts.next().unwrap_or("").trim();
    let query = parts.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres{}", base, query), db_name.to_string()))
}

//! Storage backends behind one trait: PostgreSQL and in-memory.

mod memory;
mod pg;

pub use memory::MemoryBackend;
pub use pg::{ensure_database_exists, PgBackend};

use crate::config::ResolvedEntity;
use crate::error::StoreError;
use crate::sql::QueryPlan;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A row as returned to callers: column name to JSON value, includes as nested objects.
pub type Row = Map<String, Value>;

/// Executes plans and single-row writes. Every call is independent; implementations
/// acquire whatever connection they need for the duration of the call only.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Rows matching the plan, including display includes, in plan order.
    async fn select(&self, entity: &ResolvedEntity, plan: &QueryPlan) -> Result<Vec<Row>, StoreError>;

    /// Insert one row and return its generated primary key.
    async fn insert(&self, entity: &ResolvedEntity, values: &Row) -> Result<i64, StoreError>;

    /// Update one row by primary key. `Ok(false)` when no such row exists (nothing written).
    async fn update(&self, entity: &ResolvedEntity, id: i64, values: &Row) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

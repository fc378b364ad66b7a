//! Raw entity model types as read from JSON (built-in model or `ENTITY_CONFIG` file).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// PostgreSQL type used for DDL and for parameter casts (e.g. "int4", "text", "date").
    #[serde(rename = "type")]
    pub pg_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Literal default applied on insert when the column is absent.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Path segment of the entity this column references (foreign key to its primary key).
    #[serde(default)]
    pub references: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Read-only display join: a many-to-one related row embedded as a nested object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncludeConfig {
    /// Key of the nested object in the response row.
    pub name: String,
    /// Path segment of the related entity.
    pub entity: String,
    /// Our foreign key column.
    pub via: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    /// Allowed values. For array values every element must be allowed.
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub path_segment: String,
    pub table: String,
    pub columns: Vec<ColumnConfig>,
    /// Columns matched case-insensitively by the `filtered` action.
    #[serde(default)]
    pub free_text: Vec<String>,
    /// Column names never exposed in responses nor usable as filters.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    /// Columns stored as argon2 hashes (implicitly sensitive).
    #[serde(default)]
    pub hashed_columns: Vec<String>,
    #[serde(default)]
    pub includes: Vec<IncludeConfig>,
    #[serde(default)]
    pub default_sort: Option<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

/// Which entity holds login credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountConfig {
    pub entity: String,
    pub username_column: String,
    pub password_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub account: Option<AccountConfig>,
}

fn default_schema() -> String {
    "asset".into()
}

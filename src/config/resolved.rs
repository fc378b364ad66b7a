//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use crate::error::AppError;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Many-to-one display join resolved against the related entity.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    pub name: String,
    pub related_table: String,
    pub related_pk: String,
    /// Our foreign key column.
    pub our_key: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub pg_type: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<serde_json::Value>,
    /// Table name of the referenced entity.
    pub references: Option<String>,
}

impl ColumnInfo {
    /// Normalize a JSON value to the column's type, e.g. `"2"` for an int4 column becomes `2`
    /// and an RFC 3339 timestamp for a date column becomes `YYYY-MM-DD`.
    pub fn coerce(&self, v: &Value) -> Result<Value, AppError> {
        let invalid = |what: &str| AppError::Validation(format!("{} must be {}", self.name, what));
        if v.is_null() {
            return Ok(Value::Null);
        }
        match self.pg_type.as_str() {
            "int2" | "int4" | "int8" | "integer" | "bigint" | "smallint" => {
                let n = match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                let n = n.ok_or_else(|| invalid("an integer"))?;
                let (min, max) = integer_range(&self.pg_type);
                if n < min || n > max {
                    return Err(invalid(&format!("between {} and {}", min, max)));
                }
                Ok(Value::from(n))
            }
            "float4" | "float8" | "numeric" | "real" | "double precision" => {
                let n = match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                n.filter(|f| f.is_finite())
                    .map(float_value)
                    .ok_or_else(|| invalid("a number"))
            }
            "bool" | "boolean" => match v {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                _ => Err(invalid("a boolean")),
            },
            "date" => {
                let s = v.as_str().ok_or_else(|| invalid("a date (YYYY-MM-DD)"))?;
                let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
                    .ok_or_else(|| invalid("a date (YYYY-MM-DD)"))?;
                Ok(Value::String(date.format("%Y-%m-%d").to_string()))
            }
            "json" | "jsonb" => Ok(v.clone()),
            _ => match v {
                Value::String(_) => Ok(v.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(invalid("a string")),
            },
        }
    }
}

/// Column types the model may declare. Anything else is rejected when the model is validated.
pub const KNOWN_TYPES: &[&str] = &[
    "int2", "int4", "int8", "smallint", "integer", "bigint",
    "float4", "float8", "numeric", "real", "double precision",
    "bool", "boolean", "date", "timestamp", "timestamptz",
    "json", "jsonb", "text", "varchar",
];

fn integer_range(pg_type: &str) -> (i64, i64) {
    match pg_type {
        "int2" | "smallint" => (i16::MIN as i64, i16::MAX as i64),
        "int4" | "integer" => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

/// JSON for a float column value: whole numbers render as integers (`900`, not `900.0`).
pub fn float_value(f: f64) -> Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if f.fract() == 0.0 && f.abs() < EXACT {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub path_segment: String,
    pub table_name: String,
    pub pk: String,
    pub columns: Vec<ColumnInfo>,
    pub free_text_columns: Vec<String>,
    /// Stripped from all API responses; always includes hashed columns.
    pub sensitive_columns: HashSet<String>,
    pub hashed_columns: HashSet<String>,
    pub includes: Vec<IncludeSpec>,
    pub default_sort: String,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whitelist check for filter and sort identifiers.
    pub fn is_queryable(&self, name: &str) -> bool {
        self.column(name).is_some() && !self.sensitive_columns.contains(name)
    }

    pub fn is_include(&self, name: &str) -> bool {
        self.includes.iter().any(|i| i.name == name)
    }

    /// Query parameter carrying the id for the `one` action, e.g. `assetId`.
    pub fn id_param(&self) -> String {
        format!("{}Id", self.path_segment)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedAccount {
    pub path_segment: String,
    pub username_column: String,
    pub password_column: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub schema: String,
    /// In config order, which is also foreign key dependency order.
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
    pub account: Option<ResolvedAccount>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    pub fn account_entity(&self) -> Option<(&ResolvedEntity, &ResolvedAccount)> {
        let account = self.account.as_ref()?;
        let entity = self.entity_by_path(&account.path_segment)?;
        Some((entity, account))
    }

    pub fn is_account_entity(&self, path: &str) -> bool {
        self.account.as_ref().is_some_and(|a| a.path_segment == path)
    }
}

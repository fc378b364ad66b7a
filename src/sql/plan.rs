//! Query plans: a sparse predicate template plus free-text filter, sort and paging,
//! checked against the entity whitelist. Values live only in `params`.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Exactly `ASC` or `DESC`; anything else falls back to `DESC`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("ASC") => Direction::Asc,
            _ => Direction::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
    /// Primary key appended ascending when sorting on another column.
    pub tiebreak: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column = params[param]`
    Eq { column: String, param: usize },
    /// `column_1 ILIKE params[param] OR column_2 ILIKE params[param] ...`
    AnyILike { columns: Vec<String>, param: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    /// Joined with AND.
    pub predicates: Vec<Predicate>,
    pub params: Vec<Value>,
    pub order: OrderBy,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl QueryPlan {
    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len() - 1
    }

    /// Plan selecting the single row whose primary key equals `id`.
    pub fn by_id(entity: &ResolvedEntity, id: i64) -> Self {
        QueryPlan {
            predicates: vec![Predicate::Eq {
                column: entity.pk.clone(),
                param: 0,
            }],
            params: vec![Value::from(id)],
            order: OrderBy {
                column: entity.pk.clone(),
                direction: Direction::Asc,
                tiebreak: None,
            },
            limit: Some(1),
            offset: None,
        }
    }
}

/// Sort, free-text filter and paging options, usually taken from the query string.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl QueryOptions {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let number = |key: &str| -> Result<Option<u32>, AppError> {
            params
                .get(key)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u32>()
                        .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", key)))
                })
                .transpose()
        };
        Ok(QueryOptions {
            filter: params.get("filter").cloned(),
            sort: params.get("sort").cloned(),
            direction: params.get("direction").cloned(),
            limit: number("limit")?,
            offset: number("offset")?,
        })
    }

    pub fn without_filter(mut self) -> Self {
        self.filter = None;
        self
    }
}

/// Escape LIKE metacharacters so the filter matches as a literal substring.
fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build a plan from an optional example object and options.
/// Unknown or sensitive example keys fail with `InvalidFilterField`; null values are ignored.
pub fn build_plan(
    entity: &ResolvedEntity,
    example: Option<&Map<String, Value>>,
    options: &QueryOptions,
) -> Result<QueryPlan, AppError> {
    let order = order_by(entity, options);
    let mut plan = QueryPlan {
        predicates: Vec::new(),
        params: Vec::new(),
        order,
        limit: options.limit.map(|n| n.min(MAX_LIMIT)),
        offset: options.offset,
    };

    if let Some(example) = example {
        for (key, value) in example {
            let Some(column) = entity.column(key).filter(|_| entity.is_queryable(key)) else {
                return Err(AppError::InvalidFilterField { field: key.clone() });
            };
            if value.is_null() {
                continue;
            }
            let param = plan.push_param(column.coerce(value)?);
            plan.predicates.push(Predicate::Eq {
                column: key.clone(),
                param,
            });
        }
    }

    let filter = options.filter.as_deref().map(str::trim).unwrap_or("");
    if !filter.is_empty() && !entity.free_text_columns.is_empty() {
        let param = plan.push_param(Value::String(format!("%{}%", like_escape(filter))));
        plan.predicates.push(Predicate::AnyILike {
            columns: entity.free_text_columns.clone(),
            param,
        });
    }

    Ok(plan)
}

fn order_by(entity: &ResolvedEntity, options: &QueryOptions) -> OrderBy {
    let column = match options.sort.as_deref() {
        Some(s) if entity.is_queryable(s) => s.to_string(),
        Some(s) if !s.is_empty() => {
            tracing::debug!(entity = %entity.path_segment, sort = %s, "unknown sort column, using default");
            entity.default_sort.clone()
        }
        _ => entity.default_sort.clone(),
    };
    let tiebreak = (column != entity.pk).then(|| entity.pk.clone());
    OrderBy {
        column,
        direction: Direction::parse(options.direction.as_deref()),
        tiebreak,
    }
}

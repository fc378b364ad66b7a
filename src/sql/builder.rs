//! Renders query plans, inserts and updates to parameterized PostgreSQL.
//! Identifiers come from the resolved model only; values are always `$n` parameters.

use crate::config::ResolvedEntity;
use crate::sql::{Predicate, QueryPlan};
use serde_json::{Map, Value};

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// `$n::type` so text/int parameters coerce to the column type.
fn placeholder(entity: &ResolvedEntity, column: &str, n: usize) -> String {
    match entity.column(column) {
        Some(c) => format!("${}::{}", n, c.pg_type),
        None => format!("${}", n),
    }
}

/// Equality on integer columns compares as int8, so an id beyond the column's range
/// matches nothing instead of failing the cast.
fn eq_placeholder(entity: &ResolvedEntity, column: &str, n: usize) -> String {
    match entity.column(column).map(|c| c.pg_type.as_str()) {
        Some("int2" | "int4" | "int8" | "smallint" | "integer" | "bigint") => format!("${}::int8", n),
        _ => placeholder(entity, column, n),
    }
}

fn column_expr(alias: &str, name: &str, pg_type: &str) -> String {
    if pg_type == "numeric" {
        format!("{}.{}::text", alias, quoted(name))
    } else {
        format!("{}.{}", alias, quoted(name))
    }
}

/// SELECT for a plan: every column of the entity plus one `row_to_json` scalar
/// subquery per display include, filtered, ordered and paged per the plan.
pub fn select(entity: &ResolvedEntity, plan: &QueryPlan, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.table_name);

    let mut select_parts: Vec<String> = entity
        .columns
        .iter()
        .map(|c| format!("{} AS {}", column_expr(MAIN_ALIAS, &c.name, &c.pg_type), quoted(&c.name)))
        .collect();
    for inc in &entity.includes {
        let cols = inc.columns.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ");
        select_parts.push(format!(
            "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} WHERE {} = {}.{}) sub) AS {}",
            cols,
            qualified_table(schema, &inc.related_table),
            quoted(&inc.related_pk),
            MAIN_ALIAS,
            quoted(&inc.our_key),
            quoted(&inc.name)
        ));
    }

    q.params = plan.params.clone();
    let where_parts: Vec<String> = plan
        .predicates
        .iter()
        .map(|p| match p {
            Predicate::Eq { column, param } => format!(
                "{}.{} = {}",
                MAIN_ALIAS,
                quoted(column),
                eq_placeholder(entity, column, param + 1)
            ),
            Predicate::AnyILike { columns, param } => {
                let ors = columns
                    .iter()
                    .map(|c| format!("{}.{}::text ILIKE ${}", MAIN_ALIAS, quoted(c), param + 1))
                    .collect::<Vec<_>>();
                format!("({})", ors.join(" OR "))
            }
        })
        .collect();
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };

    let mut order_clause = format!(
        " ORDER BY {}.{} {}",
        MAIN_ALIAS,
        quoted(&plan.order.column),
        plan.order.direction.as_sql()
    );
    if let Some(tiebreak) = &plan.order.tiebreak {
        order_clause.push_str(&format!(", {}.{} ASC", MAIN_ALIAS, quoted(tiebreak)));
    }
    let limit_clause = plan.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = plan.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        table,
        MAIN_ALIAS,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// INSERT of the given columns returning the generated primary key.
/// Columns absent from `values` fall back to their DB default.
pub fn insert(entity: &ResolvedEntity, values: &Map<String, Value>, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        if c.primary_key {
            continue;
        }
        let Some(val) = values.get(&c.name) else { continue };
        let n = q.push_param(val.clone());
        cols.push(quoted(&c.name));
        placeholders.push(placeholder(entity, &c.name, n));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, quoted(&entity.pk))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            quoted(&entity.pk)
        )
    };
    q
}

/// UPDATE by id: SET only columns present in `values`. Returns the primary key, so
/// an empty result means the id does not exist and nothing was written.
pub fn update(entity: &ResolvedEntity, id: i64, values: &Map<String, Value>, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &entity.table_name);
    let pk = quoted(&entity.pk);
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.primary_key {
            continue;
        }
        let Some(val) = values.get(&c.name) else { continue };
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(&c.name), placeholder(entity, &c.name, n)));
    }
    let id_param = q.push_param(Value::from(id));
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = ${}", pk, table, pk, id_param)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
            table,
            sets.join(", "),
            pk,
            id_param,
            pk
        )
    };
    q
}

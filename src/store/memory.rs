//! In-memory backend with the same observable semantics as the PostgreSQL one:
//! equality and ILIKE predicates, NULL ordering, unique columns, column defaults
//! and display includes. Counts calls and can be told to fail.

use crate::config::ResolvedEntity;
use crate::error::StoreError;
use crate::sql::{Direction, Predicate, QueryPlan};
use crate::store::{Backend, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Row>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Table>>,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend operations attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Make every following call fail with `StoreError::Unavailable(reason)`; `None` heals.
    pub fn set_failure(&self, reason: Option<&str>) {
        if let Ok(mut f) = self.failure.lock() {
            *f = reason.map(str::to_string);
        }
    }

    fn enter(&self) -> Result<MutexGuard<'_, HashMap<String, Table>>, StoreError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let failure = self
            .failure
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?
            .clone();
        if let Some(reason) = failure {
            return Err(StoreError::Unavailable(reason));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }
}

fn check_unique(entity: &ResolvedEntity, table: &Table, id: i64, values: &Row) -> Result<(), StoreError> {
    for c in entity.columns.iter().filter(|c| c.unique) {
        let Some(v) = values.get(&c.name).filter(|v| !v.is_null()) else { continue };
        let taken = table
            .rows
            .iter()
            .any(|(other, row)| *other != id && row.get(&c.name).is_some_and(|o| loose_eq(o, v)));
        if taken {
            return Err(StoreError::UniqueViolation {
                table: entity.table_name.clone(),
                column: c.name.clone(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, entity: &ResolvedEntity, plan: &QueryPlan) -> Result<Vec<Row>, StoreError> {
        let tables = self.enter()?;
        let Some(table) = tables.get(&entity.table_name) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<&Row> = table
            .rows
            .values()
            .filter(|row| plan.predicates.iter().all(|p| matches(row, p, &plan.params)))
            .collect();

        rows.sort_by(|a, b| {
            let primary = compare_nulls_last(a.get(&plan.order.column), b.get(&plan.order.column));
            let primary = match plan.order.direction {
                Direction::Asc => primary,
                Direction::Desc => primary.reverse(),
            };
            primary.then_with(|| match &plan.order.tiebreak {
                Some(t) => compare_nulls_last(a.get(t), b.get(t)),
                None => Ordering::Equal,
            })
        });

        let offset = plan.offset.unwrap_or(0) as usize;
        let limit = plan.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        let out = rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                let mut row = row.clone();
                for inc in &entity.includes {
                    let related = tables.get(&inc.related_table).and_then(|t| {
                        let key = row.get(&inc.our_key)?;
                        t.rows
                            .values()
                            .find(|r| r.get(&inc.related_pk).is_some_and(|pk| loose_eq(pk, key)))
                    });
                    let nested = match related {
                        Some(r) => Value::Object(
                            inc.columns
                                .iter()
                                .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                                .collect(),
                        ),
                        None => Value::Null,
                    };
                    row.insert(inc.name.clone(), nested);
                }
                row
            })
            .collect();
        Ok(out)
    }

    async fn insert(&self, entity: &ResolvedEntity, values: &Row) -> Result<i64, StoreError> {
        let mut tables = self.enter()?;
        let table = tables.entry(entity.table_name.clone()).or_default();
        let id = table.last_id + 1;
        check_unique(entity, table, id, values)?;

        let mut row = Row::new();
        for c in &entity.columns {
            let v = if c.primary_key {
                Value::from(id)
            } else {
                values
                    .get(&c.name)
                    .cloned()
                    .or_else(|| c.default.clone())
                    .unwrap_or(Value::Null)
            };
            row.insert(c.name.clone(), v);
        }
        table.last_id = id;
        table.rows.insert(id, row);
        Ok(id)
    }

    async fn update(&self, entity: &ResolvedEntity, id: i64, values: &Row) -> Result<bool, StoreError> {
        let mut tables = self.enter()?;
        let Some(table) = tables.get_mut(&entity.table_name) else {
            return Ok(false);
        };
        if !table.rows.contains_key(&id) {
            return Ok(false);
        }
        check_unique(entity, table, id, values)?;
        if let Some(row) = table.rows.get_mut(&id) {
            for c in entity.columns.iter().filter(|c| !c.primary_key) {
                if let Some(v) = values.get(&c.name) {
                    row.insert(c.name.clone(), v.clone());
                }
            }
        }
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().map(|_| ())
    }
}

fn matches(row: &Row, predicate: &Predicate, params: &[Value]) -> bool {
    match predicate {
        Predicate::Eq { column, param } => match (row.get(column), params.get(*param)) {
            (Some(v), Some(p)) => loose_eq(v, p),
            _ => false,
        },
        Predicate::AnyILike { columns, param } => {
            let Some(pattern) = params.get(*param).and_then(Value::as_str) else {
                return false;
            };
            columns
                .iter()
                .filter_map(|c| row.get(c).and_then(as_text))
                .any(|text| ilike(pattern, &text))
        }
    }
}

/// SQL equality: NULL equals nothing, numbers compare by value.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// ASC ordering with NULL after everything else, as PostgreSQL does by default.
fn compare_nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

enum Token {
    Any,
    One,
    Lit(char),
}

/// Case-insensitive LIKE with `\` as escape character.
fn ilike(pattern: &str, text: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Lit(chars.next().unwrap_or('\\')),
            c => Token::Lit(c),
        });
    }
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    // Greedy wildcard matching with backtracking to the last `%`.
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Any) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(Token::One) => {
                t += 1;
                p += 1;
                continue;
            }
            Some(Token::Lit(c)) if c.to_lowercase().eq(std::iter::once(text[t])) => {
                t += 1;
                p += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((bp, bt)) => {
                backtrack = Some((bp, bt + 1));
                p = bp + 1;
                t = bt + 1;
            }
            None => return false,
        }
    }
    tokens[p..].iter().all(|tok| matches!(tok, Token::Any))
}

//! Generic entity repository: reads through query plans, upsert by presence of id.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::service::password::hash_password;
use crate::service::RequestValidator;
use crate::sql::{build_plan, QueryOptions, QueryPlan};
use crate::store::{Backend, Row};
use serde::Serialize;
use serde_json::{Map, Value};

/// Result of `upsert`: whether a row was created, and its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub created: bool,
    pub id: i64,
}

pub struct EntityRepository<'a> {
    backend: &'a dyn Backend,
    entity: &'a ResolvedEntity,
}

impl<'a> EntityRepository<'a> {
    pub fn new(backend: &'a dyn Backend, entity: &'a ResolvedEntity) -> Self {
        EntityRepository { backend, entity }
    }

    pub fn entity(&self) -> &ResolvedEntity {
        self.entity
    }

    /// Rows matching the plan; empty when nothing matches.
    pub async fn find_all(&self, plan: &QueryPlan) -> Result<Vec<Row>, AppError> {
        let rows = self.select_unredacted(plan).await?;
        Ok(rows.into_iter().map(|r| self.redact(r)).collect())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Row, AppError> {
        let row = self.fetch_unredacted(id).await?;
        Ok(self.redact(row))
    }

    pub async fn find_by_example(
        &self,
        example: &Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Vec<Row>, AppError> {
        let plan = build_plan(self.entity, Some(example), options)?;
        self.find_all(&plan).await
    }

    /// Free-text search (or plain listing when `options.filter` is empty).
    pub async fn search(&self, options: &QueryOptions) -> Result<Vec<Row>, AppError> {
        let plan = build_plan(self.entity, None, options)?;
        self.find_all(&plan).await
    }

    /// Insert when the body carries no truthy id, otherwise update that row.
    /// Exactly one write is issued; a missing update target fails with `EntityNotFound`.
    pub async fn upsert(&self, body: Map<String, Value>) -> Result<UpsertOutcome, AppError> {
        let id = parse_id(&self.entity.pk, body.get(&self.entity.pk))?;
        let mut values = self.prepare(body, id.is_none())?;
        self.hash_columns(&mut values).await?;
        match id {
            Some(id) => {
                self.update_values(id, &values).await?;
                tracing::debug!(entity = %self.entity.path_segment, id, "updated");
                Ok(UpsertOutcome { created: false, id })
            }
            None => {
                let id = self
                    .backend
                    .insert(self.entity, &values)
                    .await
                    .map_err(|e| AppError::repository(self.operation("save"), e))?;
                tracing::debug!(entity = %self.entity.path_segment, id, "created");
                Ok(UpsertOutcome { created: true, id })
            }
        }
    }

    pub(crate) async fn update_values(&self, id: i64, values: &Row) -> Result<(), AppError> {
        let updated = self
            .backend
            .update(self.entity, id, values)
            .await
            .map_err(|e| AppError::repository(self.operation("save"), e))?;
        if updated {
            Ok(())
        } else {
            Err(self.not_found(id))
        }
    }

    pub(crate) async fn select_unredacted(&self, plan: &QueryPlan) -> Result<Vec<Row>, AppError> {
        self.backend
            .select(self.entity, plan)
            .await
            .map_err(|e| AppError::repository(self.operation("fetch"), e))
    }

    pub(crate) async fn fetch_unredacted(&self, id: i64) -> Result<Row, AppError> {
        let plan = QueryPlan::by_id(self.entity, id);
        self.select_unredacted(&plan)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found(id))
    }

    pub(crate) fn redact(&self, mut row: Row) -> Row {
        for col in &self.entity.sensitive_columns {
            row.remove(col);
        }
        row
    }

    fn operation(&self, verb: &str) -> String {
        format!("{} {}", verb, self.entity.path_segment)
    }

    fn not_found(&self, id: i64) -> AppError {
        AppError::EntityNotFound {
            entity: self.entity.path_segment.clone(),
            id,
        }
    }

    /// Whitelist, coerce and validate a save body into column values.
    fn prepare(&self, body: Map<String, Value>, creating: bool) -> Result<Row, AppError> {
        let entity = self.entity;
        let mut values = Row::new();
        for (key, value) in body {
            if key == entity.pk || entity.is_include(&key) {
                continue;
            }
            let column = entity
                .column(&key)
                .ok_or_else(|| AppError::Validation(format!("unknown field '{}'", key)))?;
            values.insert(key, column.coerce(&value)?);
        }

        if creating {
            RequestValidator::validate(&values, &entity.validation)?;
        } else {
            RequestValidator::validate_partial(&values, &entity.validation)?;
        }
        for c in entity.columns.iter().filter(|c| !c.primary_key && !c.nullable) {
            let v = values.get(&c.name);
            let missing = if creating {
                v.map_or(c.default.is_none(), Value::is_null)
            } else {
                v.is_some_and(Value::is_null)
            };
            if missing {
                return Err(AppError::Validation(format!("{} is required", c.name)));
            }
        }
        Ok(values)
    }

    async fn hash_columns(&self, values: &mut Row) -> Result<(), AppError> {
        for col in &self.entity.hashed_columns {
            if let Some(Value::String(plain)) = values.get(col) {
                let hashed = hash_password(plain).await?;
                values.insert(col.clone(), Value::String(hashed));
            }
        }
        Ok(())
    }
}

/// A truthy id means update. Absent, null, 0, false and "" mean insert.
fn parse_id(pk: &str, raw: Option<&Value>) -> Result<Option<i64>, AppError> {
    let invalid = || AppError::Validation(format!("{} must be an integer", pk));
    match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(None),
            Some(id) => Ok(Some(id)),
            None => Err(invalid()),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(0) => Ok(None),
            Ok(id) => Ok(Some(id)),
            Err(_) => Err(invalid()),
        },
        Some(_) => Err(invalid()),
    }
}

//! Apply the entity model to the database: schema, then one table per entity in
//! config order so referenced tables exist before their dependents.

use crate::config::{ColumnInfo, ResolvedEntity, ResolvedModel};
use crate::error::StoreError;
use crate::sql::{qualified_table, quoted};
use serde_json::Value;
use sqlx::PgPool;

/// Idempotent: `CREATE SCHEMA IF NOT EXISTS` and `CREATE TABLE IF NOT EXISTS`, in one transaction.
/// Existing tables are left untouched.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&model.schema)))
        .execute(&mut *tx)
        .await?;
    for entity in &model.entities {
        let sql = create_table_sql(model, entity);
        tracing::debug!(table = %entity.table_name, "ensuring table");
        sqlx::query(&sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(schema = %model.schema, tables = model.entities.len(), "migrations applied");
    Ok(())
}

pub fn create_table_sql(model: &ResolvedModel, entity: &ResolvedEntity) -> String {
    let defs: Vec<String> = entity
        .columns
        .iter()
        .map(|c| column_def(model, c))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(&model.schema, &entity.table_name),
        defs.join(",\n  ")
    )
}

fn column_def(model: &ResolvedModel, c: &ColumnInfo) -> String {
    let mut def = format!("{} {}", quoted(&c.name), c.pg_type);
    if c.primary_key {
        def.push_str(" GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY");
        return def;
    }
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if c.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default_literal(d));
    }
    if let Some(table) = &c.references {
        if let Some(target) = model.entities.iter().find(|e| &e.table_name == table) {
            def.push_str(&format!(
                " REFERENCES {} ({})",
                qualified_table(&model.schema, table),
                quoted(&target.pk)
            ));
        }
    }
    def
}

fn default_literal(v: &Value) -> String {
    let text = |s: &str| format!("'{}'", s.replace('\'', "''"));
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(true) => "TRUE".into(),
        Value::Bool(false) => "FALSE".into(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => text(s),
        Value::Array(_) | Value::Object(_) => format!("{}::jsonb", text(&v.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve};
    use serde_json::json;

    #[test]
    fn asset_table_ddl() {
        let model = resolve(&builtin().unwrap()).unwrap();
        let sql = create_table_sql(&model, model.entity_by_path("asset").unwrap());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"asset\".\"asset\" ("));
        assert!(sql.contains("\"id\" int4 GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"));
        assert!(sql.contains("\"name\" text NOT NULL"));
        assert!(sql.contains("\"user_id\" int4 REFERENCES \"asset\".\"user\" (\"id\")"));
        assert!(sql.contains("\"deleted\" bool NOT NULL DEFAULT FALSE"));
    }

    #[test]
    fn user_table_ddl() {
        let model = resolve(&builtin().unwrap()).unwrap();
        let sql = create_table_sql(&model, model.entity_by_path("user").unwrap());
        assert!(sql.contains("\"username\" text NOT NULL UNIQUE"));
        assert!(sql.contains("\"roles\" jsonb NOT NULL DEFAULT '[\"USER\"]'::jsonb"));
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(default_literal(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(default_literal(&json!(2.5)), "2.5");
    }
}

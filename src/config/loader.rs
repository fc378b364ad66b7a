//! Load the entity model (built-in or from a JSON file) and resolve it for runtime use.

use crate::config::resolved::{ColumnInfo, IncludeSpec, ResolvedAccount, ResolvedEntity, ResolvedModel};
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const BUILTIN_MODEL: &str = include_str!("entities.json");

/// The asset/user/department/category model shipped with the crate.
pub fn builtin() -> Result<FullConfig, ConfigError> {
    serde_json::from_str(BUILTIN_MODEL).map_err(|e| ConfigError::Load(format!("built-in model: {}", e)))
}

pub async fn load_from_file(path: &Path) -> Result<FullConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let table_by_path: HashMap<&str, &str> = config
        .entities
        .iter()
        .map(|e| (e.path_segment.as_str(), e.table.as_str()))
        .collect();
    let pk_by_path: HashMap<&str, &str> = config
        .entities
        .iter()
        .filter_map(|e| {
            e.columns
                .iter()
                .find(|c| c.primary_key)
                .map(|c| (e.path_segment.as_str(), c.name.as_str()))
        })
        .collect();

    let mut entities = Vec::with_capacity(config.entities.len());
    for e in &config.entities {
        let pk = pk_by_path
            .get(e.path_segment.as_str())
            .copied()
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                entity: e.path_segment.clone(),
                reason: "no primary key column".into(),
            })?
            .to_string();

        let columns = e
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                pg_type: c.pg_type.to_ascii_lowercase(),
                primary_key: c.primary_key,
                nullable: c.nullable && !c.primary_key,
                unique: c.unique,
                default: c.default.clone(),
                references: c
                    .references
                    .as_deref()
                    .and_then(|p| table_by_path.get(p))
                    .map(|t| t.to_string()),
            })
            .collect();

        let mut includes = Vec::with_capacity(e.includes.len());
        for inc in &e.includes {
            let related_table = table_by_path.get(inc.entity.as_str()).ok_or_else(|| {
                ConfigError::MissingReference {
                    kind: "included entity",
                    id: inc.entity.clone(),
                }
            })?;
            let related_pk = pk_by_path.get(inc.entity.as_str()).ok_or_else(|| {
                ConfigError::MissingReference {
                    kind: "included entity primary key",
                    id: inc.entity.clone(),
                }
            })?;
            includes.push(IncludeSpec {
                name: inc.name.clone(),
                related_table: related_table.to_string(),
                related_pk: related_pk.to_string(),
                our_key: inc.via.clone(),
                columns: inc.columns.clone(),
            });
        }

        let hashed_columns: HashSet<String> = e.hashed_columns.iter().cloned().collect();
        let sensitive_columns: HashSet<String> = e
            .sensitive_columns
            .iter()
            .cloned()
            .chain(hashed_columns.iter().cloned())
            .collect();

        entities.push(ResolvedEntity {
            path_segment: e.path_segment.clone(),
            table_name: e.table.clone(),
            default_sort: e.default_sort.clone().unwrap_or_else(|| pk.clone()),
            pk,
            columns,
            free_text_columns: e.free_text.clone(),
            sensitive_columns,
            hashed_columns,
            includes,
            validation: e.validation.clone(),
        });
    }

    let entity_by_path = entities
        .iter()
        .map(|e| (e.path_segment.clone(), e.clone()))
        .collect();
    let account = config.account.as_ref().map(|a| ResolvedAccount {
        path_segment: a.entity.clone(),
        username_column: a.username_column.clone(),
        password_column: a.password_column.clone(),
    });

    Ok(ResolvedModel {
        schema: config.schema.clone(),
        entities,
        entity_by_path,
        account,
    })
}

//! Config validation: identifier syntax, referential integrity and API consistency.

use crate::config::{EntityConfig, FullConfig, KNOWN_TYPES};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Identifiers are spliced into SQL text, so only plain lowercase names pass.
fn check_identifier(re: &Regex, name: &str) -> Result<(), ConfigError> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

/// Check a name that will be spliced into SQL as a quoted identifier.
pub fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    check_identifier(&identifier_regex()?, name)
}

fn identifier_regex() -> Result<Regex, ConfigError> {
    Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").map_err(|e| ConfigError::Load(e.to_string()))
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let ident = identifier_regex()?;
    check_identifier(&ident, &config.schema)?;
    if config.entities.is_empty() {
        return Err(ConfigError::Validation("at least one entity required".into()));
    }

    let mut path_segments = HashSet::new();
    let mut tables = HashSet::new();
    for e in &config.entities {
        check_identifier(&ident, &e.path_segment)?;
        check_identifier(&ident, &e.table)?;
        if !path_segments.insert(e.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(e.path_segment.clone()));
        }
        if !tables.insert(e.table.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate table: {}", e.table)));
        }
    }
    let by_path: HashMap<&str, &EntityConfig> =
        config.entities.iter().map(|e| (e.path_segment.as_str(), e)).collect();

    for e in &config.entities {
        validate_entity(&ident, e, &by_path)?;
    }

    if let Some(account) = &config.account {
        let entity = by_path
            .get(account.entity.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "account entity",
                id: account.entity.clone(),
            })?;
        let has = |c: &str| entity.columns.iter().any(|col| col.name == c);
        for col in [&account.username_column, &account.password_column] {
            if !has(col) {
                return Err(ConfigError::MissingReference {
                    kind: "account column",
                    id: col.clone(),
                });
            }
        }
        if !entity.hashed_columns.contains(&account.password_column) {
            return Err(ConfigError::Validation(format!(
                "account password column '{}' must be listed in hashed_columns",
                account.password_column
            )));
        }
    }

    Ok(())
}

fn validate_entity(
    ident: &Regex,
    e: &EntityConfig,
    by_path: &HashMap<&str, &EntityConfig>,
) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for c in &e.columns {
        check_identifier(ident, &c.name)?;
        if !KNOWN_TYPES.contains(&c.pg_type.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "column {}.{} has unsupported type '{}'",
                e.path_segment, c.name, c.pg_type
            )));
        }
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate column {}.{}",
                e.path_segment, c.name
            )));
        }
        if let Some(target) = &c.references {
            if !by_path.contains_key(target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "referenced entity",
                    id: target.clone(),
                });
            }
        }
    }

    let pks: Vec<_> = e.columns.iter().filter(|c| c.primary_key).collect();
    match pks.as_slice() {
        [pk] => {
            let t = pk.pg_type.to_ascii_lowercase();
            if !matches!(t.as_str(), "int4" | "int8" | "integer" | "bigint") {
                return Err(ConfigError::InvalidPrimaryKey {
                    entity: e.path_segment.clone(),
                    reason: format!("type {} is not an integer type", pk.pg_type),
                });
            }
        }
        [] => {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.path_segment.clone(),
                reason: "no primary key column".into(),
            })
        }
        _ => {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.path_segment.clone(),
                reason: "composite primary keys are not supported".into(),
            })
        }
    }

    let column_lists = [
        ("free_text column", &e.free_text),
        ("sensitive column", &e.sensitive_columns),
        ("hashed column", &e.hashed_columns),
    ];
    for (kind, list) in column_lists {
        for c in list {
            if !names.contains(c.as_str()) {
                return Err(ConfigError::MissingReference { kind, id: format!("{}.{}", e.path_segment, c) });
            }
        }
    }
    for c in e.validation.keys() {
        if !names.contains(c.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "validated column",
                id: format!("{}.{}", e.path_segment, c),
            });
        }
    }
    if let Some(sort) = &e.default_sort {
        if !names.contains(sort.as_str()) || e.sensitive_columns.contains(sort) || e.hashed_columns.contains(sort) {
            return Err(ConfigError::Validation(format!(
                "default_sort '{}' is not a queryable column of {}",
                sort, e.path_segment
            )));
        }
    }

    for inc in &e.includes {
        check_identifier(ident, &inc.name)?;
        if names.contains(inc.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "include '{}' shadows a column of {}",
                inc.name, e.path_segment
            )));
        }
        if !names.contains(inc.via.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "include key column",
                id: format!("{}.{}", e.path_segment, inc.via),
            });
        }
        let related = by_path
            .get(inc.entity.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "included entity",
                id: inc.entity.clone(),
            })?;
        for c in &inc.columns {
            let exposed = related.columns.iter().any(|col| col.name == *c)
                && !related.sensitive_columns.contains(c)
                && !related.hashed_columns.contains(c);
            if !exposed {
                return Err(ConfigError::MissingReference {
                    kind: "included column",
                    id: format!("{}.{}", inc.entity, c),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin;

    #[test]
    fn builtin_model_is_valid() {
        let config = builtin().unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_unsafe_identifier() {
        let mut config = builtin().unwrap();
        config.entities[0].columns[1].name = "name; DROP TABLE x".into();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidIdentifier(_))));
    }

    #[test]
    fn rejects_unknown_column_type() {
        let mut config = builtin().unwrap();
        config.entities[0].columns[1].pg_type = "text); DROP TABLE x; --".into();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        let mut config = builtin().unwrap();
        config.entities[0].columns[1].pg_type = "VARCHAR".into();
        validate(&config).unwrap();
    }

    #[test]
    fn schema_override_must_be_an_identifier() {
        validate_identifier("inventory").unwrap();
        assert!(matches!(
            validate_identifier("asset\"; DROP SCHEMA public"),
            Err(ConfigError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn rejects_dangling_reference() {
        let mut config = builtin().unwrap();
        let asset = config.entities.iter_mut().find(|e| e.path_segment == "asset").unwrap();
        let col = asset.columns.iter_mut().find(|c| c.name == "category_id").unwrap();
        col.references = Some("vendor".into());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "referenced entity", .. })
        ));
    }

    #[test]
    fn rejects_duplicate_path_segment() {
        let mut config = builtin().unwrap();
        let copy = config.entities[0].clone();
        config.entities.push(copy);
        assert!(matches!(validate(&config), Err(ConfigError::DuplicatePathSegment(_))));
    }

    #[test]
    fn include_cannot_expose_password() {
        let mut config = builtin().unwrap();
        let asset = config.entities.iter_mut().find(|e| e.path_segment == "asset").unwrap();
        asset.includes[2].columns.push("password".into());
        assert!(validate(&config).is_err());
    }
}

//! Login and password change for the configured account entity.

use crate::config::{ResolvedAccount, ResolvedModel};
use crate::error::AppError;
use crate::service::crud::EntityRepository;
use crate::service::password::{dummy_hash, hash_password, verify_password};
use crate::service::RequestValidator;
use crate::sql::{build_plan, QueryOptions};
use crate::store::{Backend, Row};
use serde::Deserialize;
use serde_json::{Map, Value};

const BAD_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// `newPassword` wins over `password` when both are sent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

pub struct AccountService<'a> {
    repo: EntityRepository<'a>,
    account: &'a ResolvedAccount,
}

impl<'a> AccountService<'a> {
    pub fn new(backend: &'a dyn Backend, model: &'a ResolvedModel) -> Result<Self, AppError> {
        let (entity, account) = model
            .account_entity()
            .ok_or_else(|| AppError::Internal("no account entity configured".into()))?;
        Ok(AccountService {
            repo: EntityRepository::new(backend, entity),
            account,
        })
    }

    /// The account row (without sensitive columns) when the credentials match.
    /// Unknown user and wrong password fail identically, each after one Argon2 verification.
    pub async fn login(&self, req: &LoginRequest) -> Result<Row, AppError> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(AppError::Validation("username and password are required".into()));
        }
        let mut example = Map::new();
        example.insert(self.account.username_column.clone(), Value::String(req.username.clone()));
        let options = QueryOptions {
            limit: Some(1),
            ..Default::default()
        };
        let plan = build_plan(self.repo.entity(), Some(&example), &options)?;
        let row = self.repo.select_unredacted(&plan).await?.into_iter().next();

        let stored = row
            .as_ref()
            .and_then(|r| r.get(&self.account.password_column))
            .and_then(Value::as_str);
        let matches = match stored {
            Some(hash) => verify_password(&req.password, hash).await?,
            None => {
                verify_password(&req.password, dummy_hash().await?).await?;
                false
            }
        };
        match row.filter(|_| matches) {
            Some(row) => {
                tracing::info!(username = %req.username, "login succeeded");
                Ok(self.repo.redact(row))
            }
            None => {
                tracing::warn!(username = %req.username, "login failed");
                Err(AppError::Unauthorized(BAD_CREDENTIALS.into()))
            }
        }
    }

    /// Replace the stored password of account `id`. When `current_password` is sent it
    /// must match before anything is written.
    pub async fn change_password(&self, id: i64, req: &ChangePasswordRequest) -> Result<(), AppError> {
        let column = &self.account.password_column;
        let new = req
            .new_password
            .as_deref()
            .or(req.password.as_deref())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Validation("newPassword is required".into()))?;
        RequestValidator::validate_value(column, &Value::String(new.into()), &self.repo.entity().validation)?;

        if let Some(current) = req.current_password.as_deref() {
            let row = self.repo.fetch_unredacted(id).await?;
            let matches = match row.get(column).and_then(Value::as_str) {
                Some(stored) => verify_password(current, stored).await?,
                None => false,
            };
            if !matches {
                tracing::warn!(id, "password change rejected");
                return Err(AppError::Unauthorized("Current password is incorrect".into()));
            }
        }

        let mut values = Row::new();
        values.insert(column.clone(), Value::String(hash_password(new).await?));
        self.repo.update_values(id, &values).await?;
        tracing::info!(id, "password changed");
        Ok(())
    }
}

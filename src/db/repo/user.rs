//! User repository (spec §4.4 `UserRepository`). Username uniqueness is the
//! only data-model invariant the spec calls out for this entity (spec §3).

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::{PkdError, Result};
use crate::model::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<Uuid>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

pub struct PgUserRepository {
    executor: Arc<dyn Executor>,
}

impl PgUserRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_user(row: &Row) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            roles: row
                .try_get::<String>("roles")?
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &User) -> Result<Uuid> {
        self.executor
            .execute_command(
                "INSERT INTO users (id, username, password_hash, roles, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    QueryParam::Uuid(user.id),
                    QueryParam::Text(user.username.clone()),
                    QueryParam::Text(user.password_hash.clone()),
                    QueryParam::Text(user.roles.join(",")),
                    QueryParam::Timestamp(user.created_at),
                ],
            )
            .await
            .map_err(|e| match e {
                PkdError::DbSaveFailed(msg) if msg.contains("unique") || msg.contains("duplicate") => {
                    PkdError::DbSaveFailed(format!("username {} already exists", user.username))
                }
                other => other,
            })?;
        Ok(user.id)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM users WHERE username = $1",
                &[QueryParam::Text(username.to_string())],
            )
            .await?;
        rows.first().map(Self::row_to_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let rows = self
            .executor
            .execute_query("SELECT * FROM users WHERE id = $1", &[QueryParam::Uuid(id)])
            .await?;
        rows.first().map(Self::row_to_user).transpose()
    }
}

//! User repository.

use std::sync::Arc;

use crate::entities::{
    User,
    user::{self, UserRole},
};
use accord_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by Telegram user id.
    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::TelegramId.eq(telegram_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by Telegram nickname (case-insensitive, without `@`).
    pub async fn find_by_telegram_nickname(
        &self,
        nickname: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::TelegramNickname.eq(nickname.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find all users holding a role, oldest first.
    pub async fn find_by_role(&self, role: UserRole) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(user::Column::Role.eq(role))
            .order_by_asc(user::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a user.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, Set};
    use serde_json::json;

    fn create_test_user(id: &str, nickname: &str, role: UserRole) -> user::Model {
        user::Model {
            id: id.to_string(),
            name: "Test User".to_string(),
            telegram_id: Some(1000),
            telegram_nickname: nickname.to_string(),
            discord_id: None,
            role,
            backers_id: json!([]),
            members_invite_link: None,
            seeders_invite_link: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let user = create_test_user("user1", "alice", UserRole::Member);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let result = repo.find_by_id("user1").await.unwrap();

        assert!(result.is_some());
        assert_eq!(result.unwrap().telegram_nickname, "alice");
    }

    #[tokio::test]
    async fn test_find_by_id_missing_is_none() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        assert!(repo.find_by_id("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_role_returns_seeders() {
        let s1 = create_test_user("s1", "seed_one", UserRole::Seeder);
        let s2 = create_test_user("s2", "seed_two", UserRole::Seeder);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[s1, s2]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let seeders = repo.find_by_role(UserRole::Seeder).await.unwrap();

        assert_eq!(seeders.len(), 2);
        assert!(seeders.iter().all(|u| u.role == UserRole::Seeder));
    }

    #[tokio::test]
    async fn test_find_by_telegram_nickname_is_case_insensitive() {
        let user = create_test_user("user1", "alice", UserRole::Guest);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user]])
                .into_connection(),
        );

        let repo = UserRepository::new(db.clone());
        let result = repo.find_by_telegram_nickname("Alice").await.unwrap();
        assert!(result.is_some());
        drop(repo);

        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        let sql = format!("{log:?}");
        assert!(sql.contains("alice"));
    }

    #[tokio::test]
    async fn test_update_returns_updated_user() {
        let user = create_test_user("user1", "alice", UserRole::Member);
        let mut promoted = user.clone();
        promoted.role = UserRole::Seeder;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[promoted.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let mut active: user::ActiveModel = user.into();
        active.role = Set(UserRole::Seeder);

        let updated = repo.update(active).await.unwrap();
        assert_eq!(updated.role, UserRole::Seeder);
    }
}

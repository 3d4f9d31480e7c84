use chrono::Utc;

use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{User, UserRole};

/// Lookup and upsert of accounts keyed by phone number. There is no
/// separate signup flow: the first verified code creates the account.
#[derive(Clone)]
pub struct UserService {
    pool: DbPool,
}

impl UserService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert-on-login. A single conflict-handling INSERT keeps the
    /// operation idempotent on identity: the second call for a number
    /// only bumps `last_login_at`.
    pub async fn find_or_create_by_phone(&self, phone_number: &str) -> AppResult<User> {
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (phone_number, role, last_login_at, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (phone_number) DO UPDATE SET last_login_at = excluded.last_login_at \
             RETURNING *",
        )
        .bind(phone_number)
        .bind(UserRole::User)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_phone_number(&self, phone_number: &str) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone_number = ?1")
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(&self, user_id: i64) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    const PHONE: &str = "+15550001111";

    #[tokio::test]
    async fn test_find_or_create_creates_with_defaults() {
        let pool = test_pool().await;
        let users = UserService::new(pool);

        let user = users.find_or_create_by_phone(PHONE).await.unwrap();
        assert_eq!(user.phone_number, PHONE);
        assert_eq!(user.role, UserRole::User);
        assert!(user.name.is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent_on_identity() {
        let pool = test_pool().await;
        let users = UserService::new(pool);

        let first = users.find_or_create_by_phone(PHONE).await.unwrap();
        let second = users.find_or_create_by_phone(PHONE).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.last_login_at >= first.last_login_at);

        // Still exactly one row for the number.
        let by_phone = users.find_by_phone_number(PHONE).await.unwrap();
        assert_eq!(by_phone.id, first.id);
    }

    #[tokio::test]
    async fn test_find_by_phone_number_does_not_create() {
        let pool = test_pool().await;
        let users = UserService::new(pool);

        assert!(matches!(
            users.find_by_phone_number(PHONE).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let pool = test_pool().await;
        let users = UserService::new(pool);

        let created = users.find_or_create_by_phone(PHONE).await.unwrap();
        let fetched = users.find_by_id(created.id).await.unwrap();
        assert_eq!(fetched.phone_number, PHONE);

        assert!(users.find_by_id(created.id + 1).await.is_err());
    }
}

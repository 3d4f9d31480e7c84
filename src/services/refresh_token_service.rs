use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{RefreshToken, TokenPair, User, UserRole};
use crate::utils::JwtService;

/// Refresh-token persistence plus token-pair issuance. Refresh tokens
/// are opaque UUIDs stored server-side; access tokens are signed by the
/// JwtService and never persisted.
#[derive(Clone)]
pub struct RefreshTokenService {
    pool: DbPool,
    jwt_service: JwtService,
    refresh_token_expires_in: i64,
}

impl RefreshTokenService {
    pub fn new(pool: DbPool, jwt_service: JwtService, refresh_expires_in: i64) -> Self {
        Self {
            pool,
            jwt_service,
            refresh_token_expires_in: refresh_expires_in,
        }
    }

    pub async fn create_refresh_token(&self, user_id: i64) -> AppResult<String> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.refresh_token_expires_in);

        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Signs the access token and persists the refresh token
    /// concurrently; the pair is only issued if both succeed.
    pub async fn issue_token_pair(&self, user_id: i64, role: &UserRole) -> AppResult<TokenPair> {
        let access = async { self.jwt_service.generate_access_token(user_id, role) };
        let refresh = self.create_refresh_token(user_id);

        let (access_token, refresh_token) = tokio::try_join!(access, refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }

    /// Single-use consumption: the row is deleted by the same statement
    /// that matches it, so a token value can only ever be redeemed once.
    pub async fn consume_by_token(&self, token: &str) -> AppResult<(RefreshToken, User)> {
        let record = sqlx::query_as::<_, RefreshToken>(
            "DELETE FROM refresh_tokens WHERE token = ?1 AND expires_at > ?2 RETURNING *",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let record = record.ok_or(AppError::InvalidRefreshToken)?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(record.user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::InvalidRefreshToken)?;

        Ok((record, user))
    }

    /// Rotation: destroys the submitted token and issues a fresh pair
    /// for its owner.
    pub async fn refresh_tokens(&self, token: &str) -> AppResult<(User, TokenPair)> {
        let (_record, user) = self.consume_by_token(token).await?;
        let pair = self.issue_token_pair(user.id, &user.role).await?;
        Ok((user, pair))
    }

    pub async fn revoke_by_token(&self, token: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidRefreshToken);
        }

        Ok(())
    }

    /// Bulk revocation, e.g. on a credential change. Not part of the
    /// login flows.
    pub async fn revoke_all_for_user(&self, user_id: i64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::services::UserService;

    const PHONE: &str = "+15550001111";

    async fn setup() -> (RefreshTokenService, UserService, DbPool) {
        let pool = test_pool().await;
        let jwt = JwtService::new("test-secret", 900);
        (
            RefreshTokenService::new(pool.clone(), jwt, 2_592_000),
            UserService::new(pool.clone()),
            pool,
        )
    }

    #[tokio::test]
    async fn test_issue_token_pair_persists_refresh_row() {
        let (tokens, users, pool) = setup().await;
        let user = users.find_or_create_by_phone(PHONE).await.unwrap();

        let pair = tokens.issue_token_pair(user.id, &user.role).await.unwrap();
        assert!(!pair.access_token.is_empty());
        assert_eq!(pair.expires_in, 900);

        let row = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token = ?1",
        )
        .bind(&pair.refresh_token)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.user_id, user.id);
        assert!(row.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_dies() {
        let (tokens, users, _pool) = setup().await;
        let user = users.find_or_create_by_phone(PHONE).await.unwrap();
        let pair = tokens.issue_token_pair(user.id, &user.role).await.unwrap();

        let (owner, new_pair) = tokens.refresh_tokens(&pair.refresh_token).await.unwrap();
        assert_eq!(owner.id, user.id);
        assert_ne!(new_pair.refresh_token, pair.refresh_token);

        // The consumed value never authenticates again.
        assert!(matches!(
            tokens.refresh_tokens(&pair.refresh_token).await,
            Err(AppError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_rejected() {
        let (_, users, pool) = setup().await;
        let user = users.find_or_create_by_phone(PHONE).await.unwrap();

        let jwt = JwtService::new("test-secret", 900);
        let expired = RefreshTokenService::new(pool, jwt, -60);
        let token = expired.create_refresh_token(user.id).await.unwrap();

        assert!(matches!(
            expired.consume_by_token(&token).await,
            Err(AppError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_revoke_then_refresh_fails() {
        let (tokens, users, _pool) = setup().await;
        let user = users.find_or_create_by_phone(PHONE).await.unwrap();
        let pair = tokens.issue_token_pair(user.id, &user.role).await.unwrap();

        tokens.revoke_by_token(&pair.refresh_token).await.unwrap();

        assert!(matches!(
            tokens.refresh_tokens(&pair.refresh_token).await,
            Err(AppError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_revoke_unknown_token_fails() {
        let (tokens, _, _pool) = setup().await;

        assert!(matches!(
            tokens.revoke_by_token("no-such-token").await,
            Err(AppError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let (tokens, users, _pool) = setup().await;
        let user = users.find_or_create_by_phone(PHONE).await.unwrap();
        let other = users.find_or_create_by_phone("+15550002222").await.unwrap();

        let a = tokens.issue_token_pair(user.id, &user.role).await.unwrap();
        let b = tokens.issue_token_pair(user.id, &user.role).await.unwrap();
        let kept = tokens.issue_token_pair(other.id, &other.role).await.unwrap();

        assert_eq!(tokens.revoke_all_for_user(user.id).await.unwrap(), 2);
        assert!(tokens.consume_by_token(&a.refresh_token).await.is_err());
        assert!(tokens.consume_by_token(&b.refresh_token).await.is_err());

        // Other users keep their sessions.
        tokens.consume_by_token(&kept.refresh_token).await.unwrap();
    }
}

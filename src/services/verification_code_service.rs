use chrono::{Duration, Utc};

use crate::config::AuthConfig;
use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::VerificationCode;
use crate::utils::generate_verification_code;

/// Persistence for one-time SMS codes. Several live codes per phone
/// number may coexist; rows are never deleted.
#[derive(Clone)]
pub struct VerificationCodeService {
    pool: DbPool,
    code_expires_in: i64,
    resend_interval_secs: i64,
}

impl VerificationCodeService {
    pub fn new(pool: DbPool, config: &AuthConfig) -> Self {
        Self {
            pool,
            code_expires_in: config.code_expires_in,
            resend_interval_secs: config.resend_interval_secs,
        }
    }

    pub fn code_expires_in(&self) -> i64 {
        self.code_expires_in
    }

    pub async fn create_code(&self, phone_number: &str) -> AppResult<VerificationCode> {
        let now = Utc::now();

        // Resend throttle: refuse a new code while the previous one for
        // this number is younger than the configured interval.
        if self.resend_interval_secs > 0 {
            let latest = sqlx::query_as::<_, VerificationCode>(
                "SELECT * FROM verification_codes WHERE phone_number = ?1 ORDER BY id DESC LIMIT 1",
            )
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(latest) = latest
                && now.signed_duration_since(latest.created_at)
                    < Duration::seconds(self.resend_interval_secs)
            {
                return Err(AppError::ValidationError(
                    "Code requested too frequently, please try again later".to_string(),
                ));
            }
        }

        let code = generate_verification_code();
        let expires_at = now + Duration::seconds(self.code_expires_in);

        let record = sqlx::query_as::<_, VerificationCode>(
            "INSERT INTO verification_codes (phone_number, code, is_used, created_at, expires_at) \
             VALUES (?1, ?2, 0, ?3, ?4) RETURNING *",
        )
        .bind(phone_number)
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Marks the newest matching live code as used and returns it. The
    /// check and the flip are one conditional UPDATE, so two concurrent
    /// attempts can never both consume the same code.
    pub async fn consume_valid_code(
        &self,
        phone_number: &str,
        code: &str,
    ) -> AppResult<VerificationCode> {
        let record = sqlx::query_as::<_, VerificationCode>(
            "UPDATE verification_codes SET is_used = 1 \
             WHERE id = ( \
                 SELECT id FROM verification_codes \
                 WHERE phone_number = ?1 AND code = ?2 AND is_used = 0 AND expires_at > ?3 \
                 ORDER BY id DESC LIMIT 1 \
             ) AND is_used = 0 \
             RETURNING *",
        )
        .bind(phone_number)
        .bind(code)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(AppError::InvalidOrExpiredCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    const PHONE: &str = "+15550001111";

    fn service(pool: DbPool) -> VerificationCodeService {
        VerificationCodeService::new(
            pool,
            &AuthConfig {
                code_expires_in: 300,
                resend_interval_secs: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_create_code_persists_unused_record() {
        let pool = test_pool().await;
        let codes = service(pool);

        let record = codes.create_code(PHONE).await.unwrap();
        assert_eq!(record.phone_number, PHONE);
        assert_eq!(record.code.len(), 4);
        assert!(!record.is_used);

        let remaining = record.expires_at - Utc::now();
        assert!(remaining > Duration::seconds(290));
        assert!(remaining <= Duration::seconds(300));
    }

    #[tokio::test]
    async fn test_code_is_consumed_at_most_once() {
        let pool = test_pool().await;
        let codes = service(pool);

        let record = codes.create_code(PHONE).await.unwrap();
        let consumed = codes.consume_valid_code(PHONE, &record.code).await.unwrap();
        assert_eq!(consumed.id, record.id);
        assert!(consumed.is_used);

        assert!(matches!(
            codes.consume_valid_code(PHONE, &record.code).await,
            Err(AppError::InvalidOrExpiredCode)
        ));
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected() {
        let pool = test_pool().await;
        let codes = service(pool);

        let record = codes.create_code(PHONE).await.unwrap();
        let wrong = if record.code == "1234" { "4321" } else { "1234" };

        assert!(matches!(
            codes.consume_valid_code(PHONE, wrong).await,
            Err(AppError::InvalidOrExpiredCode)
        ));
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() {
        let pool = test_pool().await;
        let codes = VerificationCodeService::new(
            pool,
            &AuthConfig {
                code_expires_in: -60, // already expired at creation
                resend_interval_secs: 0,
            },
        );

        let record = codes.create_code(PHONE).await.unwrap();
        assert!(matches!(
            codes.consume_valid_code(PHONE, &record.code).await,
            Err(AppError::InvalidOrExpiredCode)
        ));
    }

    #[tokio::test]
    async fn test_multiple_live_codes_may_coexist() {
        let pool = test_pool().await;
        let codes = service(pool);

        let first = codes.create_code(PHONE).await.unwrap();
        let second = codes.create_code(PHONE).await.unwrap();
        assert_ne!(first.id, second.id);

        // Both stay individually consumable.
        codes.consume_valid_code(PHONE, &second.code).await.unwrap();
        codes.consume_valid_code(PHONE, &first.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_resend_throttle() {
        let pool = test_pool().await;
        let codes = VerificationCodeService::new(
            pool,
            &AuthConfig {
                code_expires_in: 300,
                resend_interval_secs: 60,
            },
        );

        codes.create_code(PHONE).await.unwrap();
        assert!(matches!(
            codes.create_code(PHONE).await,
            Err(AppError::ValidationError(_))
        ));

        // Other numbers are unaffected.
        codes.create_code("+15550002222").await.unwrap();
    }
}

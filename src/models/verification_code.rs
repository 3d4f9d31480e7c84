use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One-time SMS code. Rows are kept after use for audit; `is_used`
/// flips exactly once and expiry is enforced at query time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: i64,
    pub phone_number: String,
    pub code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};

use crate::models::UserResponse;

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestCodeRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestCodeResponse {
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub phone_number: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Freshly issued access/refresh pair. `expires_in` is the access-token
/// lifetime in seconds.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

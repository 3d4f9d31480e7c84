use crate::error::AppResult;
use crate::external::SmsGateway;
use crate::models::{AuthResponse, RequestCodeResponse};
use crate::services::{RefreshTokenService, UserService, VerificationCodeService};
use crate::utils::validate_phone_number;

/// Orchestrates the login flows: request-code, verify-code, refresh and
/// logout. Stateless; everything lives in the store.
#[derive(Clone)]
pub struct AuthService {
    verification_codes: VerificationCodeService,
    users: UserService,
    refresh_tokens: RefreshTokenService,
    sms_gateway: SmsGateway,
}

impl AuthService {
    pub fn new(
        verification_codes: VerificationCodeService,
        users: UserService,
        refresh_tokens: RefreshTokenService,
        sms_gateway: SmsGateway,
    ) -> Self {
        Self {
            verification_codes,
            users,
            refresh_tokens,
            sms_gateway,
        }
    }

    /// Issues a code and hands it to the SMS gateway. Delivery is
    /// best-effort: the code counts as issued even if the send fails.
    pub async fn request_code(&self, phone_number: &str) -> AppResult<RequestCodeResponse> {
        validate_phone_number(phone_number)?;

        let record = self.verification_codes.create_code(phone_number).await?;

        let message = format!("Your verification code is: {}", record.code);
        if !self.sms_gateway.send(phone_number, &message).await {
            log::warn!("SMS delivery failed for {phone_number}");
        }

        log::info!("Verification code issued for {phone_number}");

        Ok(RequestCodeResponse {
            expires_in: self.verification_codes.code_expires_in(),
        })
    }

    /// Consumes the code, upserts the account and mints a token pair.
    pub async fn verify_code(&self, phone_number: &str, code: &str) -> AppResult<AuthResponse> {
        validate_phone_number(phone_number)?;

        self.verification_codes
            .consume_valid_code(phone_number, code)
            .await?;

        let user = self.users.find_or_create_by_phone(phone_number).await?;
        let pair = self
            .refresh_tokens
            .issue_token_pair(user.id, &user.role)
            .await?;

        log::info!("User {} logged in", user.id);

        Ok(AuthResponse {
            user: user.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        })
    }

    /// Rotates the submitted refresh token: the old value is destroyed
    /// and a fresh pair issued in the same flow.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let (user, pair) = self.refresh_tokens.refresh_tokens(refresh_token).await?;

        Ok(AuthResponse {
            user: user.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        })
    }

    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        self.refresh_tokens.revoke_by_token(refresh_token).await
    }
}

use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

use crate::models::*;
use crate::services::AuthService;

pub async fn request_code(
    auth_service: web::Data<AuthService>,
    request: web::Json<RequestCodeRequest>,
) -> Result<HttpResponse> {
    match auth_service.request_code(&request.phone_number).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response,
            "message": "Verification code sent"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub async fn verify_code(
    auth_service: web::Data<AuthService>,
    request: web::Json<VerifyCodeRequest>,
) -> Result<HttpResponse> {
    match auth_service
        .verify_code(&request.phone_number, &request.code)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response,
            "message": "Code verified successfully"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub async fn refresh(
    auth_service: web::Data<AuthService>,
    request: web::Json<RefreshRequest>,
) -> Result<HttpResponse> {
    match auth_service.refresh(&request.refresh_token).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub async fn logout(
    auth_service: web::Data<AuthService>,
    request: web::Json<LogoutRequest>,
) -> Result<HttpResponse> {
    match auth_service.logout(&request.refresh_token).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Logged out"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/request-code", web::post().to(request_code))
            .route("/verify-code", web::post().to(verify_code))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout)),
    );
}

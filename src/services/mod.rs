pub mod auth_service;
pub mod refresh_token_service;
pub mod user_service;
pub mod verification_code_service;

pub use auth_service::*;
pub use refresh_token_service::*;
pub use user_service::*;
pub use verification_code_service::*;

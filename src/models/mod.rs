pub mod auth;
pub mod refresh_token;
pub mod user;
pub mod verification_code;

pub use auth::*;
pub use refresh_token::*;
pub use user::*;
pub use verification_code::*;

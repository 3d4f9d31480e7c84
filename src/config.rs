use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_access_expires_in")]
    pub access_token_expires_in: i64, // seconds
    #[serde(default = "default_refresh_expires_in")]
    pub refresh_token_expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsConfig {
    /// Development mode logs outbound messages instead of sending them.
    #[serde(default)]
    pub development: bool,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_code_expires_in")]
    pub code_expires_in: i64, // seconds
    /// Minimum gap between two codes for the same number; 0 disables.
    #[serde(default = "default_resend_interval")]
    pub resend_interval_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_expires_in: default_code_expires_in(),
            resend_interval_secs: default_resend_interval(),
        }
    }
}

fn default_access_expires_in() -> i64 {
    900 // 15 minutes
}

fn default_refresh_expires_in() -> i64 {
    2_592_000 // 30 days
}

fn default_code_expires_in() -> i64 {
    300 // 5 minutes
}

fn default_resend_interval() -> i64 {
    60
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // Read the config file when present, otherwise build entirely
        // from environment variables.
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "DATABASE_URL is not set and config file {config_path} was not found"
                    ))
                })?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET").unwrap_or_default(),
                        access_token_expires_in: get_env_parse(
                            "JWT_ACCESS_EXPIRES_IN",
                            default_access_expires_in(),
                        ),
                        refresh_token_expires_in: get_env_parse(
                            "JWT_REFRESH_EXPIRES_IN",
                            default_refresh_expires_in(),
                        ),
                    },
                    sms: SmsConfig {
                        development: get_env_parse("SMS_DEVELOPMENT", false),
                        account_sid: get_env("TWILIO_ACCOUNT_SID").unwrap_or_default(),
                        auth_token: get_env("TWILIO_AUTH_TOKEN").unwrap_or_default(),
                        from_phone: get_env("TWILIO_FROM_PHONE").unwrap_or_default(),
                    },
                    auth: AuthConfig {
                        code_expires_in: get_env_parse(
                            "AUTH_CODE_EXPIRES_IN",
                            default_code_expires_in(),
                        ),
                        resend_interval_secs: get_env_parse(
                            "AUTH_RESEND_INTERVAL_SECS",
                            default_resend_interval(),
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Failed to read config file {config_path}: {e}"
                )));
            }
        };

        // Environment overrides apply even when the file exists.
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.access_token_expires_in = n;
        }
        if let Ok(v) = env::var("JWT_REFRESH_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.refresh_token_expires_in = n;
        }
        if let Ok(v) = env::var("SMS_DEVELOPMENT")
            && let Ok(b) = v.parse()
        {
            config.sms.development = b;
        }
        if let Ok(v) = env::var("TWILIO_ACCOUNT_SID") {
            config.sms.account_sid = v;
        }
        if let Ok(v) = env::var("TWILIO_AUTH_TOKEN") {
            config.sms.auth_token = v;
        }
        if let Ok(v) = env::var("TWILIO_FROM_PHONE") {
            config.sms.from_phone = v;
        }
        if let Ok(v) = env::var("AUTH_CODE_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.auth.code_expires_in = n;
        }
        if let Ok(v) = env::var("AUTH_RESEND_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            config.auth.resend_interval_secs = n;
        }

        config.validate()?;

        Ok(config)
    }

    // The signing secret may only be absent in development, where the
    // SMS gateway also runs in logging mode.
    fn validate(&self) -> AppResult<()> {
        if self.jwt.secret.is_empty() && !self.sms.development {
            return Err(AppError::ConfigError(
                "JWT_SECRET is required outside development mode".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifetime_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [database]
            url = "sqlite::memory:"
            max_connections = 5

            [jwt]
            secret = "test-secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.jwt.access_token_expires_in, 900);
        assert_eq!(config.jwt.refresh_token_expires_in, 2_592_000);
        assert_eq!(config.auth.code_expires_in, 300);
        assert_eq!(config.auth.resend_interval_secs, 60);
        assert!(!config.sms.development);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secret_is_fatal_outside_development() {
        let mut config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [database]
            url = "sqlite::memory:"
            max_connections = 5

            [jwt]
            secret = ""
            "#,
        )
        .unwrap();

        assert!(config.validate().is_err());

        config.sms.development = true;
        assert!(config.validate().is_ok());
    }
}

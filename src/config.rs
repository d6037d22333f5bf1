use anyhow::{Context, Result};

pub const DEFAULT_AUTO_LOGOUT_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_idle: u32,
    /// Issuer claim stamped into every token.
    pub app_name: String,
    pub auth_token_secret: String,
    pub refresh_token_secret: String,
    pub auto_logout_minutes: i64,
    pub admin_email: String,
    pub admin_username: String,
    pub admin_password: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid u16")?;
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite::memory:".to_string());
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DB_MAX_CONNECTIONS must be a valid u32")?;
        let db_min_idle = std::env::var("DB_MIN_IDLE")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u32>()
            .context("DB_MIN_IDLE must be a valid u32")?;
        let app_name = std::env::var("APP_NAME").unwrap_or_else(|_| "campus".to_string());
        let auto_logout_minutes = std::env::var("AUTO_LOGOUT_MINUTES")
            .unwrap_or_else(|_| DEFAULT_AUTO_LOGOUT_MINUTES.to_string())
            .parse::<i64>()
            .context("AUTO_LOGOUT_MINUTES must be a valid i64")?;
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".to_string());

        let auth_token_secret = secret_from_env("AUTH_TOKEN_SECRET", "auth-secret-change-me")?;
        let refresh_token_secret =
            secret_from_env("REFRESH_TOKEN_SECRET", "refresh-secret-change-me")?;
        if auth_token_secret == refresh_token_secret {
            anyhow::bail!("AUTH_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be distinct");
        }

        let admin_email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".to_string());
        let admin_username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password =
            std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin-change-me".to_string());

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            db_min_idle,
            app_name,
            auth_token_secret,
            refresh_token_secret,
            auto_logout_minutes,
            admin_email,
            admin_username,
            admin_password,
            log_level,
        })
    }
}

fn secret_from_env(name: &'static str, debug_default: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(val) => Ok(val),
        Err(_) if cfg!(debug_assertions) => Ok(debug_default.to_string()),
        Err(err) => {
            Err(anyhow::anyhow!(err)).context(format!("{name} is required in release builds"))
        }
    }
}

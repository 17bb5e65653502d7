//! Application configuration

use std::env;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid("APP_ENV must be 'development' or 'production'")),
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Which identity provider backs session checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Supabase auth cookies (multi-tenant area)
    Supabase,
    /// Single shared admin password (legacy admin area)
    Password,
}

impl AuthStrategy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(AuthStrategy::Supabase),
            "password" => Ok(AuthStrategy::Password),
            _ => Err(ConfigError::Invalid("AUTH_STRATEGY must be 'supabase' or 'password'")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub environment: Environment,
    pub app_domain: String, // e.g., "example.com" for *.example.com tenants
    pub dev_host: String,   // e.g., "localhost:3000", tenant comes from ?org=

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub auth_strategy: AuthStrategy,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub admin_session_secret: String,
    pub admin_session_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_strategy =
            AuthStrategy::parse(&env::var("AUTH_STRATEGY").unwrap_or_else(|_| "supabase".to_string()))?;

        let app_domain = env::var("APP_DOMAIN")
            .map_err(|_| ConfigError::Missing("APP_DOMAIN"))?
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        if app_domain.is_empty() || app_domain.contains(':') || app_domain.contains('/') {
            return Err(ConfigError::Invalid(
                "APP_DOMAIN must be a bare domain such as example.com",
            ));
        }

        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = env::var("SUPABASE_ANON_KEY").unwrap_or_default();

        if auth_strategy == AuthStrategy::Supabase {
            if supabase_url.is_empty() {
                return Err(ConfigError::Missing("SUPABASE_URL"));
            }
            if supabase_anon_key.is_empty() {
                return Err(ConfigError::Missing("SUPABASE_ANON_KEY"));
            }
        }

        let admin_session_secret = env::var("ADMIN_SESSION_SECRET").unwrap_or_default();
        if auth_strategy == AuthStrategy::Password {
            if admin_session_secret.is_empty() {
                return Err(ConfigError::Missing("ADMIN_SESSION_SECRET"));
            }
            // Signing key for admin session tokens must be strong
            if admin_session_secret.len() < 32 {
                return Err(ConfigError::WeakSecret(
                    "ADMIN_SESSION_SECRET must be at least 32 characters",
                ));
            }
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            environment: Environment::parse(
                &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            )?,
            app_domain,
            dev_host: env::var("DEV_HOST")
                .unwrap_or_else(|_| "localhost:3000".to_string())
                .to_ascii_lowercase(),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Authentication
            auth_strategy,
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET").unwrap_or_default(),
            admin_session_secret,
            admin_session_ttl_hours: env::var("ADMIN_SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

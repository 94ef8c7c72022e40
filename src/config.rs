use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub max_body_size: usize,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub bootstrap: Option<BootstrapAdmin>,
}

/// Credentials for the first Rohirrim account, created only while the users table is empty.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("EDORAS_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid EDORAS_HOST: {e}"))?;

        let port: u16 = env_or("EDORAS_PORT", "5000")
            .parse()
            .map_err(|e| format!("Invalid EDORAS_PORT: {e}"))?;

        let access_token_ttl_minutes: i64 = env_or("EDORAS_ACCESS_TOKEN_TTL_MINUTES", "60")
            .parse()
            .map_err(|e| format!("Invalid EDORAS_ACCESS_TOKEN_TTL_MINUTES: {e}"))?;

        let refresh_token_ttl_days: i64 = env_or("EDORAS_REFRESH_TOKEN_TTL_DAYS", "30")
            .parse()
            .map_err(|e| format!("Invalid EDORAS_REFRESH_TOKEN_TTL_DAYS: {e}"))?;

        if access_token_ttl_minutes <= 0 || refresh_token_ttl_days <= 0 {
            return Err("Token lifetimes must be positive".to_string());
        }

        let max_body_size: usize = env_or("EDORAS_MAX_BODY_SIZE", "1048576")
            .parse()
            .map_err(|e| format!("Invalid EDORAS_MAX_BODY_SIZE: {e}"))?;

        let cors_origins = parse_list(&env_or("EDORAS_CORS_ORIGINS", "http://localhost:3000"));

        let log_level = env_or("EDORAS_LOG_LEVEL", "info");

        let bootstrap = match (
            std::env::var("EDORAS_BOOTSTRAP_EMAIL").ok(),
            std::env::var("EDORAS_BOOTSTRAP_USERNAME").ok(),
            std::env::var("EDORAS_BOOTSTRAP_PASSWORD").ok(),
        ) {
            (Some(email), Some(username), Some(password)) => Some(BootstrapAdmin {
                email,
                username,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            max_body_size,
            cors_origins,
            log_level,
            bootstrap,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

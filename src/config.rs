use serde::Deserialize;

pub const DEFAULT_RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Settings for the bot-verification (reCAPTCHA) service.
#[derive(Debug, Clone, Deserialize)]
pub struct RecaptchaConfig {
    pub secret: String,
    pub verify_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub recaptcha: RecaptchaConfig,
    pub password_pepper: String,
    pub default_project: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accounts".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accounts-users".into()),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 60),
        };
        let recaptcha = RecaptchaConfig {
            secret: std::env::var("RECAPTCHA_SECRET")?,
            verify_url: std::env::var("RECAPTCHA_VERIFY_URL")
                .unwrap_or_else(|_| DEFAULT_RECAPTCHA_VERIFY_URL.into()),
            timeout_secs: nonzero_secs(
                "RECAPTCHA_TIMEOUT_SECS",
                parse_or("RECAPTCHA_TIMEOUT_SECS", 5),
            )?,
        };
        let password_pepper = std::env::var("PASSWORD_PEPPER")?;
        if password_pepper.is_empty() {
            anyhow::bail!("PASSWORD_PEPPER must not be empty");
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            recaptcha,
            password_pepper,
            default_project: std::env::var("DEFAULT_PROJECT").unwrap_or_else(|_| "default".into()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// A zero timeout would fail every outbound call before it starts.
fn nonzero_secs(key: &str, secs: u64) -> anyhow::Result<u64> {
    if secs == 0 {
        anyhow::bail!("{key} must be at least 1 second");
    }
    Ok(secs)
}

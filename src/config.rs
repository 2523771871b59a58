use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub password_reset_ttl_seconds: u64,
    pub verify_email_ttl_seconds: u64,
    pub invitation_ttl_seconds: u64,
    pub bcrypt_cost: u32,
    pub rate_limits: RateLimitConfig,
    pub notification_queue_capacity: usize,
    pub notification_timeout_seconds: u64,
    pub session_sweep_interval_seconds: u64,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

/// Sliding-window thresholds for the abuse-sensitive auth endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Per email and client IP.
    pub login_max: u64,
    /// Per email across every IP, sharing the login window.
    pub login_account_max: u64,
    pub login_window_seconds: u64,
    pub password_reset_max: u64,
    pub password_reset_window_seconds: u64,
    pub password_reset_min_interval_seconds: u64,
    pub verify_email_max: u64,
    pub verify_email_window_seconds: u64,
    pub verify_email_min_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_max: 20,
            login_account_max: 100,
            login_window_seconds: 600,
            password_reset_max: 5,
            password_reset_window_seconds: 3600,
            password_reset_min_interval_seconds: 30,
            verify_email_max: 5,
            verify_email_window_seconds: 3600,
            verify_email_min_interval_seconds: 30,
        }
    }
}

impl RateLimitConfig {
    /// Every window must be positive.
    pub fn validate(&self) -> anyhow::Result<()> {
        let windows = [
            ("RATE_LIMIT_LOGIN_WINDOW_SECONDS", self.login_window_seconds),
            (
                "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                self.password_reset_window_seconds,
            ),
            (
                "RATE_LIMIT_VERIFY_EMAIL_WINDOW_SECONDS",
                self.verify_email_window_seconds,
            ),
        ];
        for (key, seconds) in windows {
            if seconds == 0 {
                anyhow::bail!("Invalid value for {}: window must be positive", key);
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = RateLimitConfig::default();
        let config = Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed("PORT", 8080)?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "opsdesk".into()),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "opsdesk-portal".into()),
            jwt_expiry_seconds: parsed("JWT_EXPIRY_SECONDS", 900)?,
            refresh_token_ttl_seconds: parsed("REFRESH_TOKEN_TTL_SECONDS", 30 * 24 * 60 * 60)?,
            password_reset_ttl_seconds: parsed("PASSWORD_RESET_TTL_SECONDS", 3600)?,
            verify_email_ttl_seconds: parsed("VERIFY_EMAIL_TTL_SECONDS", 24 * 60 * 60)?,
            invitation_ttl_seconds: parsed("INVITATION_TTL_SECONDS", 7 * 24 * 60 * 60)?,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            rate_limits: RateLimitConfig {
                login_max: parsed("RATE_LIMIT_LOGIN_MAX", defaults.login_max)?,
                login_account_max: parsed(
                    "RATE_LIMIT_LOGIN_ACCOUNT_MAX",
                    defaults.login_account_max,
                )?,
                login_window_seconds: parsed(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    defaults.login_window_seconds,
                )?,
                password_reset_max: parsed(
                    "RATE_LIMIT_PASSWORD_RESET_MAX",
                    defaults.password_reset_max,
                )?,
                password_reset_window_seconds: parsed(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    defaults.password_reset_window_seconds,
                )?,
                password_reset_min_interval_seconds: parsed(
                    "RATE_LIMIT_PASSWORD_RESET_MIN_INTERVAL_SECONDS",
                    defaults.password_reset_min_interval_seconds,
                )?,
                verify_email_max: parsed("RATE_LIMIT_VERIFY_EMAIL_MAX", defaults.verify_email_max)?,
                verify_email_window_seconds: parsed(
                    "RATE_LIMIT_VERIFY_EMAIL_WINDOW_SECONDS",
                    defaults.verify_email_window_seconds,
                )?,
                verify_email_min_interval_seconds: parsed(
                    "RATE_LIMIT_VERIFY_EMAIL_MIN_INTERVAL_SECONDS",
                    defaults.verify_email_min_interval_seconds,
                )?,
            },
            notification_queue_capacity: parsed("NOTIFICATION_QUEUE_CAPACITY", 256)?,
            notification_timeout_seconds: parsed("NOTIFICATION_TIMEOUT_SECONDS", 10)?,
            session_sweep_interval_seconds: parsed("SESSION_SWEEP_INTERVAL_SECONDS", 3600)?,
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
        };
        config.rate_limits.validate()?;
        Ok(config)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing required env var: {}", key))
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_valid() {
        RateLimitConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_window_is_rejected() {
        let limits = RateLimitConfig {
            password_reset_window_seconds: 0,
            ..RateLimitConfig::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS"));
    }
}

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Telegram bot used to notify the print operator
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
}

/// Order Service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database (in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Operator auth
    pub operator_jwt_secret: String,

    // Uploads
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,

    // Operator notifications
    pub telegram: Option<TelegramSettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Operator auth
        let operator_jwt_secret =
            env::var("OPERATOR_JWT_SECRET").context("OPERATOR_JWT_SECRET must be set")?;
        if operator_jwt_secret.len() < 32 {
            anyhow::bail!("OPERATOR_JWT_SECRET must be at least 32 bytes");
        }

        // Uploads
        let upload_dir = PathBuf::from(
            env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
        );
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024);

        // Operator notifications
        let telegram = match (env::var("TELEGRAM_BOT_TOKEN"), env::var("TELEGRAM_CHAT_ID")) {
            (Ok(bot_token), Ok(chat_id)) if !bot_token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramSettings {
                    api_url: env::var("TELEGRAM_API_URL")
                        .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
                    bot_token,
                    chat_id,
                })
            }
            _ => None,
        };

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            cors_allow_origins,
            operator_jwt_secret,
            upload_dir,
            max_upload_bytes,
            telegram,
        })
    }

    /// Dev settings with an in-memory store and no notifications.
    pub fn local(operator_jwt_secret: impl Into<String>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            database_max_connections: 1,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            operator_jwt_secret: operator_jwt_secret.into(),
            upload_dir: upload_dir.into(),
            max_upload_bytes: 50 * 1024 * 1024,
            telegram: None,
        }
    }
}

/// Client-side workflow settings
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub order_service_url: String,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub history_path: PathBuf,
    pub history_capacity: usize,
    /// Time a completed order stays on screen before the workflow resets
    pub reset_delay: Duration,
}

/// Bounds for confirmation polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Requests per polling round before giving up
    pub max_attempts: u32,
    /// Consecutive failures before the status is reported as unconfirmed
    pub failure_threshold: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
            failure_threshold: 3,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            order_service_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
            history_path: PathBuf::from("order_history.json"),
            history_capacity: 10,
            reset_delay: Duration::from_millis(3000),
        }
    }
}

impl WorkflowSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let poll = PollPolicy {
            interval: Duration::from_secs(parse_var("POLL_INTERVAL_SECONDS", 10)),
            max_attempts: parse_var("POLL_MAX_ATTEMPTS", defaults.poll.max_attempts),
            failure_threshold: parse_var(
                "POLL_FAILURE_THRESHOLD",
                defaults.poll.failure_threshold,
            ),
        };
        if poll.interval.is_zero() || poll.max_attempts == 0 {
            anyhow::bail!("POLL_INTERVAL_SECONDS and POLL_MAX_ATTEMPTS must be positive");
        }

        let history_capacity = parse_var("ORDER_HISTORY_CAPACITY", defaults.history_capacity);
        if history_capacity == 0 {
            anyhow::bail!("ORDER_HISTORY_CAPACITY must be positive");
        }

        Ok(Self {
            order_service_url: env::var("ORDER_SERVICE_URL")
                .unwrap_or(defaults.order_service_url),
            request_timeout: Duration::from_secs(parse_var(
                "ORDER_SERVICE_TIMEOUT_SECONDS",
                30,
            )),
            poll,
            history_path: env::var("ORDER_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
            history_capacity,
            reset_delay: Duration::from_millis(parse_var("RESET_DELAY_MILLIS", 3000)),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW_VARS: [&str; 4] = [
        "POLL_INTERVAL_SECONDS",
        "ORDER_HISTORY_CAPACITY",
        "ORDER_SERVICE_URL",
        "RESET_DELAY_MILLIS",
    ];

    // One test owns these variables; the process environment is shared.
    #[test]
    fn workflow_settings_read_from_environment() {
        for var in WORKFLOW_VARS {
            env::remove_var(var);
        }
        let settings = WorkflowSettings::from_env().unwrap();
        assert_eq!(settings.poll, PollPolicy::default());
        assert_eq!(settings.history_capacity, 10);
        assert_eq!(settings.reset_delay, Duration::from_millis(3000));

        env::set_var("POLL_INTERVAL_SECONDS", "5");
        env::set_var("ORDER_HISTORY_CAPACITY", "25");
        env::set_var("ORDER_SERVICE_URL", "https://orders.example.md");
        env::set_var("RESET_DELAY_MILLIS", "not-a-number");
        let settings = WorkflowSettings::from_env().unwrap();
        assert_eq!(settings.poll.interval, Duration::from_secs(5));
        assert_eq!(settings.history_capacity, 25);
        assert_eq!(settings.order_service_url, "https://orders.example.md");
        assert_eq!(settings.reset_delay, Duration::from_millis(3000));

        env::set_var("ORDER_HISTORY_CAPACITY", "0");
        assert!(WorkflowSettings::from_env().is_err());

        for var in WORKFLOW_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn unknown_environment_is_dev() {
        assert_eq!(Environment::from_str("Production"), Environment::Prod);
        assert_eq!(Environment::from_str(""), Environment::Dev);
    }
}

use gateway_api::{
    extraction::WatchdogConfig, inference::InferenceConfig, mail::SmtpSettings,
    otp::OtpReplayPolicy, state::StateConfig,
};
use std::{env, str::FromStr, time::Duration};

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub port: u16,
    pub state: StateConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .or_else(|| var("POSTGRES_DSN"))
            .ok_or(ConfigError::MissingVar("DATABASE_URL"))?;
        let jwt_key = var("JWT_KEY").ok_or(ConfigError::MissingVar("JWT_KEY"))?;

        let defaults = InferenceConfig::default();
        let inference = InferenceConfig {
            url: var("INFERENCE_URL").unwrap_or(defaults.url),
            call_timeout: seconds(&var, "INFERENCE_CALL_TIMEOUT_SECS", defaults.call_timeout)?,
            connect_timeout: seconds(
                &var,
                "INFERENCE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            )?,
            connect_retries: parsed(&var, "INFERENCE_CONNECT_RETRIES", defaults.connect_retries)?,
            retry_delay: seconds(&var, "INFERENCE_RETRY_DELAY_SECS", defaults.retry_delay)?,
        };
        if inference.connect_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "INFERENCE_CONNECT_RETRIES".to_string(),
            ));
        }

        let watchdog_defaults = WatchdogConfig::default();
        let watchdog = WatchdogConfig {
            poll_interval: seconds(
                &var,
                "EXTRACTION_WATCHDOG_INTERVAL_SECS",
                watchdog_defaults.poll_interval,
            )?,
            max_duration: seconds(
                &var,
                "EXTRACTION_WATCHDOG_MAX_SECS",
                watchdog_defaults.max_duration,
            )?,
        };
        if watchdog.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "EXTRACTION_WATCHDOG_INTERVAL_SECS".to_string(),
            ));
        }

        let otp_replay_policy = match var("OTP_REPLAY_POLICY") {
            Some(raw) => raw
                .parse::<OtpReplayPolicy>()
                .map_err(|e| ConfigError::InvalidValue(format!("OTP_REPLAY_POLICY: {}", e)))?,
            None => OtpReplayPolicy::default(),
        };

        Ok(GatewayConfig {
            port: parsed(&var, "GATEWAY_PORT", 8080)?,
            state: StateConfig {
                database_url,
                jwt_key,
                inference,
                smtp: smtp_settings(&var)?,
                otp_replay_policy,
                watchdog,
            },
        })
    }
}

/// `None` unless both a login and a password are configured.
fn smtp_settings(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<SmtpSettings>, ConfigError> {
    let username = var("SMTP_USERNAME").or_else(|| var("SMTP_FROM_EMAIL"));
    let (Some(username), Some(password)) = (username, var("SMTP_PWD")) else {
        return Ok(None);
    };

    Ok(Some(SmtpSettings {
        host: var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
        port: parsed(var, "SMTP_PORT", 587)?,
        from_email: var("SMTP_FROM_EMAIL").unwrap_or_else(|| username.clone()),
        from_name: var("SMTP_FROM_NAME").unwrap_or_else(|| "Gateway".to_string()),
        username,
        password,
    }))
}

fn parsed<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parsed(var, key, default.as_secs()).map(Duration::from_secs)
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
        }
    }
}

impl std::error::Error for ConfigError {}

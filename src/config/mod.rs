use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少环境变量 {0}")]
    Missing(&'static str),

    #[error("环境变量 {var} 的值无效: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 业务时区，所有“今天”的计算都以此为准
    pub timezone: Tz,
    /// 每日到期检查时间
    pub expiry_check_time: NaiveTime,
    /// 到期提醒档位（天），按顺序执行
    pub expiry_reminder_days: Vec<i64>,
    pub reminder_dedupe: bool,
    pub database_max_connections: u32,
    pub database_statement_timeout_secs: u64,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源解析配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| lookup(var).ok_or(ConfigError::Missing(var));
        let optional = |var: &'static str, default: &str| {
            lookup(var).unwrap_or_else(|| default.to_string())
        };

        let jwt_expiration_hours = parse_number::<u64>(
            "JWT_EXPIRATION",
            optional("JWT_EXPIRATION", "24").trim_end_matches('h'),
        )?;

        let jwt_expiration_secs =
            jwt_expiration_hours
                .checked_mul(3600)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "JWT_EXPIRATION",
                    value: jwt_expiration_hours.to_string(),
                })?;

        let api_base_uri = parse_base_uri(&optional("API_BASE_URI", "/api"))?;

        let timezone_raw = optional("APP_TIMEZONE", "Asia/Shanghai");
        let timezone = timezone_raw
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid {
                var: "APP_TIMEZONE",
                value: timezone_raw.clone(),
            })?;

        let check_time_raw = optional("EXPIRY_CHECK_TIME", "09:00");
        let expiry_check_time = NaiveTime::parse_from_str(&check_time_raw, "%H:%M")
            .map_err(|_| ConfigError::Invalid {
                var: "EXPIRY_CHECK_TIME",
                value: check_time_raw.clone(),
            })?;

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs,
            rate_limit_window_secs: parse_number(
                "RATE_LIMIT_WINDOW",
                &optional("RATE_LIMIT_WINDOW", "60"),
            )?,
            rate_limit_requests: parse_number(
                "RATE_LIMIT_REQUESTS",
                &optional("RATE_LIMIT_REQUESTS", "100"),
            )?,
            server_host: optional("SERVER_HOST", "::"),
            server_port: parse_number("SERVER_PORT", &optional("SERVER_PORT", "3000"))?,
            api_base_uri,
            timezone,
            expiry_check_time,
            expiry_reminder_days: parse_reminder_days(&optional("EXPIRY_REMINDER_DAYS", "7,3,1"))?,
            reminder_dedupe: parse_flag("REMINDER_DEDUPE", &optional("REMINDER_DEDUPE", "true"))?,
            database_max_connections: parse_number(
                "DATABASE_MAX_CONNECTIONS",
                &optional("DATABASE_MAX_CONNECTIONS", "10"),
            )?,
            database_statement_timeout_secs: parse_number(
                "DATABASE_STATEMENT_TIMEOUT",
                &optional("DATABASE_STATEMENT_TIMEOUT", "5"),
            )?,
            run_migrations: parse_flag("RUN_MIGRATIONS", &optional("RUN_MIGRATIONS", "true"))?,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.database_statement_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
    })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

/// 路由前缀必须以 `/` 开头，且不能是根路径
fn parse_base_uri(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.contains("//") {
        return Err(ConfigError::Invalid {
            var: "API_BASE_URI",
            value: raw.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_reminder_days(raw: &str) -> Result<Vec<i64>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        var: "EXPIRY_REMINDER_DAYS",
        value: raw.to_string(),
    };

    let days = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.trim().parse::<i64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    if days.is_empty() || days.iter().any(|d| *d < 0) {
        return Err(invalid());
    }
    Ok(days)
}

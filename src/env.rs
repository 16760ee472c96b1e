use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://mathlearn.db?mode=rwc";
pub const DEFAULT_LOGIN_PROVIDER_URL: &str = "/oauth2/start?rd=/api/login";

const SESSION_TTL_HOURS_RANGE: RangeInclusive<i64> = 1..=24 * 366;
const QUIZ_TIME_LIMIT_SECS_RANGE: RangeInclusive<u32> = 1..=24 * 60 * 60;
const QUIZ_ATTEMPT_MAX_AGE_MINUTES_RANGE: RangeInclusive<i64> = 1..=7 * 24 * 60;

/// Application settings read from the process environment after
/// [`load_environment`] has layered the env files.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub session_ttl_hours: i64,
    pub login_provider_url: String,
    pub admin_emails: Vec<String>,
    pub quiz_time_limit_secs: u32,
    pub quiz_attempt_max_age_minutes: i64,
    pub otlp_endpoint: Option<String>,
    pub deployment_environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_ttl_hours: 24 * 7,
            login_provider_url: DEFAULT_LOGIN_PROVIDER_URL.to_string(),
            admin_emails: Vec::new(),
            quiz_time_limit_secs: crate::quiz::DEFAULT_TIME_LIMIT_SECS,
            quiz_attempt_max_age_minutes: 120,
            otlp_endpoint: None,
            deployment_environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: dotenvy::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.database_url),
            session_ttl_hours: parse_bounded(
                "SESSION_TTL_HOURS",
                defaults.session_ttl_hours,
                SESSION_TTL_HOURS_RANGE,
            ),
            login_provider_url: dotenvy::var("LOGIN_PROVIDER_URL")
                .unwrap_or(defaults.login_provider_url),
            admin_emails: dotenvy::var("ADMIN_EMAILS")
                .map(|raw| parse_email_list(&raw))
                .unwrap_or_default(),
            quiz_time_limit_secs: parse_bounded(
                "QUIZ_TIME_LIMIT_SECS",
                defaults.quiz_time_limit_secs,
                QUIZ_TIME_LIMIT_SECS_RANGE,
            ),
            quiz_attempt_max_age_minutes: parse_bounded(
                "QUIZ_ATTEMPT_MAX_AGE_MINUTES",
                defaults.quiz_attempt_max_age_minutes,
                QUIZ_ATTEMPT_MAX_AGE_MINUTES_RANGE,
            ),
            otlp_endpoint: dotenvy::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty()),
            deployment_environment: dotenvy::var("DEPLOYMENT_ENVIRONMENT")
                .unwrap_or(defaults.deployment_environment),
        }
    }

    pub fn is_admin_email(&self, email: Option<&str>) -> bool {
        match email {
            Some(email) => {
                let email = email.trim().to_lowercase();
                self.admin_emails.iter().any(|admin| *admin == email)
            }
            None => false,
        }
    }
}

fn parse_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match dotenvy::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = %name, value = %raw, "Ignoring unparseable setting");
                default
            }
        },
        Err(_) => default,
    }
}

/// Out-of-range values are clamped to the nearest bound.
fn parse_bounded<T>(name: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + Copy + PartialOrd + Display,
{
    let value = parse_var(name, default);
    let bounded = if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        return value;
    };

    warn!(variable = %name, value = %value, used = %bounded, "Clamping out-of-range setting");
    bounded
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(
            [
                "DATABASE_URL",
                "SESSION_TTL_HOURS",
                "ADMIN_EMAILS",
                "QUIZ_TIME_LIMIT_SECS",
                "OTEL_EXPORTER_OTLP_ENDPOINT",
            ],
            || {
                let config = AppConfig::from_env();
                assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
                assert_eq!(config.session_ttl_hours, 168);
                assert_eq!(config.quiz_time_limit_secs, 300);
                assert!(config.admin_emails.is_empty());
                assert!(config.otlp_endpoint.is_none());
            },
        );
    }

    #[test]
    #[serial]
    fn test_reads_overrides() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite::memory:")),
                ("SESSION_TTL_HOURS", Some("2")),
                ("ADMIN_EMAILS", Some(" Ada@Example.com, ,grace@example.com")),
                ("QUIZ_TIME_LIMIT_SECS", Some("not-a-number")),
            ],
            || {
                let config = AppConfig::from_env();
                assert_eq!(config.database_url, "sqlite::memory:");
                assert_eq!(config.session_ttl_hours, 2);
                assert_eq!(
                    config.admin_emails,
                    vec!["ada@example.com".to_string(), "grace@example.com".to_string()]
                );
                assert_eq!(config.quiz_time_limit_secs, 300);
            },
        );
    }

    #[test]
    #[serial]
    fn test_out_of_range_durations_are_clamped() {
        temp_env::with_vars(
            [
                ("SESSION_TTL_HOURS", Some("9223372036854775807")),
                ("QUIZ_TIME_LIMIT_SECS", Some("0")),
                ("QUIZ_ATTEMPT_MAX_AGE_MINUTES", Some("-30")),
            ],
            || {
                let config = AppConfig::from_env();
                assert_eq!(config.session_ttl_hours, 24 * 366);
                assert_eq!(config.quiz_time_limit_secs, 1);
                assert_eq!(config.quiz_attempt_max_age_minutes, 1);

                // the clamped values must stay usable in chrono arithmetic
                let now = chrono::Utc::now();
                let ttl = chrono::Duration::hours(config.session_ttl_hours);
                let max_age = chrono::Duration::minutes(config.quiz_attempt_max_age_minutes);
                assert!(now.checked_add_signed(ttl).is_some());
                assert!(now.checked_sub_signed(max_age).is_some());
            },
        );
        temp_env::with_vars([("SESSION_TTL_HOURS", Some("-5"))], || {
            assert_eq!(AppConfig::from_env().session_ttl_hours, 1);
        });
    }

    #[test]
    fn test_admin_email_match_is_case_insensitive() {
        let config = AppConfig {
            admin_emails: vec!["ada@example.com".to_string()],
            ..AppConfig::default()
        };

        assert!(config.is_admin_email(Some("ADA@example.com")));
        assert!(!config.is_admin_email(Some("bob@example.com")));
        assert!(!config.is_admin_email(None));
    }
}

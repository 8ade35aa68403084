use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::approvals::ApprovalPolicy;
use crate::workflows::eligibility::CertificationConfig;
use crate::workflows::job_applications::{
    JobApplicationPolicy, JobApplicationState, UnknownState, DEFAULT_ARCHIVABLE_STATES,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the engine and its batch commands.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub approvals: ApprovalPolicy,
    pub job_applications: JobApplicationPolicy,
    pub certification: CertificationConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let approval_defaults = ApprovalPolicy::default();
        let number_prefix = env::var("IAE_APPROVAL_NUMBER_PREFIX")
            .unwrap_or_else(|_| approval_defaults.number_prefix.clone());
        if number_prefix.trim().is_empty() {
            return Err(ConfigError::Empty {
                variable: "IAE_APPROVAL_NUMBER_PREFIX",
            });
        }
        let approvals = ApprovalPolicy {
            validity_months: parse_var(
                "IAE_APPROVAL_VALIDITY_MONTHS",
                approval_defaults.validity_months,
            )?,
            number_prefix: number_prefix.trim().to_string(),
            ..approval_defaults
        };

        let job_defaults = JobApplicationPolicy::default();
        let job_applications = JobApplicationPolicy {
            hiring_start_tolerance_days: parse_var(
                "IAE_HIRING_START_TOLERANCE_DAYS",
                job_defaults.hiring_start_tolerance_days,
            )?,
            auto_reject_after_days: parse_var(
                "IAE_AUTO_REJECT_AFTER_DAYS",
                job_defaults.auto_reject_after_days,
            )?,
            archive_after_days: parse_var(
                "IAE_ARCHIVE_AFTER_DAYS",
                job_defaults.archive_after_days,
            )?,
            archivable_states: parse_states("IAE_ARCHIVABLE_STATES")?,
        };

        let certification_defaults = CertificationConfig::default();
        let certification = CertificationConfig {
            max_attempts: parse_var(
                "IAE_CERTIFICATION_MAX_ATTEMPTS",
                certification_defaults.max_attempts,
            )?,
            ..certification_defaults
        };

        let registry = RegistryConfig {
            url: env::var("IAE_REGISTRY_URL")
                .ok()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            timeout: Duration::from_millis(parse_var("IAE_REGISTRY_TIMEOUT_MS", 5_000)?),
        };

        let store = StoreConfig {
            path: PathBuf::from(
                env::var("IAE_STORE_PATH").unwrap_or_else(|_| "pass-iae.json".to_string()),
            ),
            lock_timeout: Duration::from_millis(parse_var("IAE_LOCK_TIMEOUT_MS", 2_000)?),
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            approvals,
            job_applications,
            certification,
            registry,
            store,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the certification registry lives. Certification is skipped without a URL.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

/// Location of the JSON snapshot backing the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub lock_timeout: Duration,
}

fn parse_var<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable,
                    value: raw.clone(),
                })
        }
        _ => Ok(default),
    }
}

fn parse_states(variable: &'static str) -> Result<Vec<JobApplicationState>, ConfigError> {
    let raw = match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(DEFAULT_ARCHIVABLE_STATES.to_vec()),
    };
    let mut states = Vec::new();
    for item in raw.split(',').filter(|item| !item.trim().is_empty()) {
        let state = item
            .parse::<JobApplicationState>()
            .map_err(|source| ConfigError::InvalidState { variable, source })?;
        if !states.contains(&state) {
            states.push(state);
        }
    }
    Ok(states)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    InvalidState {
        variable: &'static str,
        source: UnknownState,
    },
    Empty {
        variable: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be a number, got '{value}'")
            }
            ConfigError::InvalidState { variable, source } => {
                write!(f, "{variable} lists an invalid state: {source}")
            }
            ConfigError::Empty { variable } => write!(f, "{variable} must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidState { source, .. } => Some(source),
            ConfigError::InvalidNumber { .. } | ConfigError::Empty { .. } => None,
        }
    }
}

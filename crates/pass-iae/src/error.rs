use crate::config::ConfigError;
use crate::store::SnapshotError;
use crate::telemetry::TelemetryError;
use crate::workflows::approvals::ApprovalServiceError;
use crate::workflows::eligibility::{EligibilityServiceError, RegistryError};
use crate::workflows::job_applications::JobApplicationServiceError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Snapshot(SnapshotError),
    Registry(RegistryError),
    Workflow(WorkflowError),
}

/// Failure raised by one of the workflow services.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Approval(#[from] ApprovalServiceError),
    #[error(transparent)]
    Eligibility(#[from] EligibilityServiceError),
    #[error(transparent)]
    JobApplication(#[from] JobApplicationServiceError),
}

impl WorkflowError {
    pub const fn code(&self) -> &'static str {
        match self {
            WorkflowError::Approval(err) => err.code(),
            WorkflowError::Eligibility(err) => err.code(),
            WorkflowError::JobApplication(err) => err.code(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Snapshot(err) => write!(f, "store snapshot error: {}", err),
            AppError::Registry(err) => write!(f, "certification registry error: {}", err),
            AppError::Workflow(err) => write!(f, "workflow error [{}]: {}", err.code(), err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Snapshot(err) => Some(err),
            AppError::Registry(err) => Some(err),
            AppError::Workflow(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SnapshotError> for AppError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<ApprovalServiceError> for AppError {
    fn from(value: ApprovalServiceError) -> Self {
        Self::Workflow(value.into())
    }
}

impl From<EligibilityServiceError> for AppError {
    fn from(value: EligibilityServiceError) -> Self {
        Self::Workflow(value.into())
    }
}

impl From<JobApplicationServiceError> for AppError {
    fn from(value: JobApplicationServiceError) -> Self {
        Self::Workflow(value.into())
    }
}

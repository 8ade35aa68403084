//! Client for the external registry confirming administrative criteria.

use std::fmt::Debug;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Runtime;

use super::domain::AdministrativeCriterion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificationRequest {
    pub criterion: AdministrativeCriterion,
    pub last_name: String,
    pub first_name: String,
    pub birthdate: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_place: Option<String>,
    pub birth_country: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CertificationResponse {
    pub is_certified: bool,
    /// First day the registry confirms the criterion, set when certified.
    #[serde(default)]
    pub start_at: Option<NaiveDate>,
    #[serde(default)]
    pub raw_response: Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("certification registry timed out")]
    Timeout,
    #[error("certification registry rate limited the request")]
    RateLimited,
    #[error("certification registry unavailable: {0}")]
    Unavailable(String),
    /// The registry does not know the person or lacks profile data. Final.
    #[error("certification registry rejected the request with status {status}")]
    Rejected { status: u16, payload: Value },
    #[error("certification registry is not configured")]
    NotConfigured,
}

impl RegistryError {
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Timeout | RegistryError::RateLimited | RegistryError::Unavailable(_)
        )
    }

    pub const fn code(&self) -> &'static str {
        match self {
            RegistryError::Timeout => "registry_timeout",
            RegistryError::RateLimited => "registry_rate_limited",
            RegistryError::Unavailable(_) => "registry_unavailable",
            RegistryError::Rejected { .. } => "registry_rejected",
            RegistryError::NotConfigured => "registry_not_configured",
        }
    }
}

pub trait CertificationRegistry: Debug + Send + Sync {
    fn certify(&self, request: &CertificationRequest)
        -> Result<CertificationResponse, RegistryError>;
}

/// Registry used when no endpoint is configured; every call is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRegistry;

impl CertificationRegistry for DisabledRegistry {
    fn certify(
        &self,
        _request: &CertificationRequest,
    ) -> Result<CertificationResponse, RegistryError> {
        Err(RegistryError::NotConfigured)
    }
}

/// Blocking facade over an async reqwest client so the synchronous workflows can call it.
pub struct HttpCertificationRegistry {
    client: Client,
    runtime: Runtime,
    base_url: String,
}

impl HttpCertificationRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RegistryError::Unavailable(err.to_string()))?;
        let runtime = Runtime::new().map_err(|err| RegistryError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            runtime,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, criterion: AdministrativeCriterion) -> String {
        format!(
            "{}/criteria/{}/certifications",
            self.base_url.trim_end_matches('/'),
            criterion.label()
        )
    }

    fn map_transport(err: reqwest::Error) -> RegistryError {
        if err.is_timeout() {
            RegistryError::Timeout
        } else {
            RegistryError::Unavailable(err.to_string())
        }
    }
}

impl Debug for HttpCertificationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCertificationRegistry")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CertificationRegistry for HttpCertificationRegistry {
    fn certify(
        &self,
        request: &CertificationRequest,
    ) -> Result<CertificationResponse, RegistryError> {
        let url = self.endpoint(request.criterion);
        self.runtime.block_on(async {
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(Self::map_transport)?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<CertificationResponse>()
                    .await
                    .map_err(|err| RegistryError::Unavailable(format!("unreadable answer: {err}")));
            }
            match status {
                StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                    let payload = response.json::<Value>().await.unwrap_or(Value::Null);
                    Err(RegistryError::Rejected {
                        status: status.as_u16(),
                        payload,
                    })
                }
                StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
                    Err(RegistryError::RateLimited)
                }
                other => Err(RegistryError::Unavailable(format!("status {other}"))),
            }
        })
    }
}

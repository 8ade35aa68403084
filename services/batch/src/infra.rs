use chrono::{DateTime, NaiveDate, Utc};
use pass_iae::clock::{Clock, FixedClock, SystemClock};
use pass_iae::config::{AppConfig, RegistryConfig};
use pass_iae::error::AppError;
use pass_iae::store::InMemoryStore;
use pass_iae::workflows::eligibility::{
    CertificationRegistry, DisabledRegistry, EligibilityPolicy, EligibilityService,
    HttpCertificationRegistry,
};
use pass_iae::workflows::events::TracingEventPublisher;
use pass_iae::workflows::job_applications::JobApplicationService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub(crate) type Eligibility =
    EligibilityService<InMemoryStore, dyn CertificationRegistry, BatchClock>;
pub(crate) type JobApplications = JobApplicationService<
    InMemoryStore,
    dyn CertificationRegistry,
    BatchClock,
    TracingEventPublisher,
>;

/// Wall clock, or a frozen date when the run is pinned with `--today`.
#[derive(Debug)]
pub(crate) enum BatchClock {
    System(SystemClock),
    Pinned(FixedClock),
}

impl BatchClock {
    pub(crate) fn new(today: Option<NaiveDate>) -> Self {
        match today {
            Some(date) => Self::Pinned(FixedClock::on(date)),
            None => Self::System(SystemClock),
        }
    }
}

impl Clock for BatchClock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            BatchClock::System(clock) => clock.now(),
            BatchClock::Pinned(clock) => clock.now(),
        }
    }
}

/// Store snapshot plus the services a batch command runs against.
pub(crate) struct BatchContext {
    path: PathBuf,
    store: Arc<InMemoryStore>,
    clock: Arc<BatchClock>,
    eligibility: Arc<Eligibility>,
    config: AppConfig,
}

impl BatchContext {
    pub(crate) fn open(
        config: &AppConfig,
        store: Option<PathBuf>,
        today: Option<NaiveDate>,
    ) -> Result<Self, AppError> {
        let path = store.unwrap_or_else(|| config.store.path.clone());
        let store = Arc::new(
            InMemoryStore::load_or_default(&path)?.with_lock_timeout(config.store.lock_timeout),
        );
        let clock = Arc::new(BatchClock::new(today));
        let eligibility = Arc::new(EligibilityService::new(
            store.clone(),
            build_registry(&config.registry)?,
            clock.clone(),
            EligibilityPolicy::default(),
            config.certification.clone(),
        ));
        info!(store = %path.display(), today = %clock.today(), "batch context opened");
        Ok(Self {
            path,
            store,
            clock,
            eligibility,
            config: config.clone(),
        })
    }

    pub(crate) fn eligibility(&self) -> &Eligibility {
        &self.eligibility
    }

    pub(crate) fn job_applications(&self) -> JobApplications {
        JobApplicationService::new(
            self.store.clone(),
            self.clock.clone(),
            self.eligibility.clone(),
            Arc::new(TracingEventPublisher),
            self.config.approvals.clone(),
            self.config.job_applications.clone(),
        )
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the store back to the snapshot file.
    pub(crate) fn save(&self) -> Result<(), AppError> {
        self.store.save_to_path(&self.path)?;
        Ok(())
    }
}

pub(crate) fn build_registry(
    config: &RegistryConfig,
) -> Result<Arc<dyn CertificationRegistry>, AppError> {
    match &config.url {
        Some(url) => Ok(Arc::new(HttpCertificationRegistry::new(
            url.clone(),
            config.timeout,
        )?)),
        None => Ok(Arc::new(DisabledRegistry)),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

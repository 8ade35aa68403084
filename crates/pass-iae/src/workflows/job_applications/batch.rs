//! Maintenance batches over job applications. Each record runs in its own transaction, so
//! a failure on one record leaves the others untouched.

use tracing::{info, warn};

use super::domain::AUTO_REJECTABLE_STATES;
use super::service::{JobApplicationService, JobApplicationServiceError};
use crate::clock::Clock;
use crate::store::Store;
use crate::workflows::eligibility::CertificationRegistry;
use crate::workflows::events::EventPublisher;
use crate::workflows::ids::JobApplicationId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub examined: usize,
    pub changed: usize,
    pub failed: usize,
}

impl BatchReport {
    fn tally(&mut self, id: JobApplicationId, outcome: Result<bool, JobApplicationServiceError>) {
        self.examined += 1;
        match outcome {
            Ok(true) => self.changed += 1,
            Ok(false) => {}
            Err(err) => {
                self.failed += 1;
                warn!(
                    job_application = %id,
                    code = err.code(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "batch record failed"
                );
            }
        }
    }
}

/// Refuses with the `Auto` reason every new or processing application untouched for longer
/// than the configured delay. Safe to re-run.
pub fn auto_reject_stale_applications<S, R, C, P>(
    service: &JobApplicationService<S, R, C, P>,
) -> Result<BatchReport, JobApplicationServiceError>
where
    S: Store + 'static,
    R: CertificationRegistry + ?Sized + 'static,
    C: Clock + 'static,
    P: EventPublisher + ?Sized + 'static,
{
    let candidates = service.ids_in_states(&AUTO_REJECTABLE_STATES)?;
    let mut report = BatchReport::default();
    for id in candidates {
        report.tally(id, service.reject_if_stale(id));
    }
    info!(
        examined = report.examined,
        refused = report.changed,
        failed = report.failed,
        "stale job applications auto-rejected"
    );
    Ok(report)
}

/// Archives every application of the archivable subset older than the retention delay.
pub fn archive_job_applications<S, R, C, P>(
    service: &JobApplicationService<S, R, C, P>,
) -> Result<BatchReport, JobApplicationServiceError>
where
    S: Store + 'static,
    R: CertificationRegistry + ?Sized + 'static,
    C: Clock + 'static,
    P: EventPublisher + ?Sized + 'static,
{
    let candidates = service.ids_in_states(&service.policy().archivable_states)?;
    let mut report = BatchReport::default();
    for id in candidates {
        report.tally(id, service.archive_if_stale(id));
    }
    info!(
        examined = report.examined,
        archived = report.changed,
        failed = report.failed,
        "job applications archived"
    );
    Ok(report)
}

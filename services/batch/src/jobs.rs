use crate::infra::BatchContext;
use chrono::NaiveDate;
use clap::Args;
use pass_iae::config::AppConfig;
use pass_iae::error::AppError;
use pass_iae::workflows::job_applications::{
    archive_job_applications, auto_reject_stale_applications,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// Snapshot file to read and update (defaults to IAE_STORE_PATH)
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
    /// Run as if today were this date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_auto_reject(config: &AppConfig, args: BatchArgs) -> Result<(), AppError> {
    let context = BatchContext::open(config, args.store, args.today)?;
    let report = auto_reject_stale_applications(&context.job_applications())?;
    context.save()?;
    println!(
        "auto-reject: examined {} refused {} failed {} ({})",
        report.examined,
        report.changed,
        report.failed,
        context.path().display()
    );
    Ok(())
}

pub(crate) fn run_archive(config: &AppConfig, args: BatchArgs) -> Result<(), AppError> {
    let context = BatchContext::open(config, args.store, args.today)?;
    let report = archive_job_applications(&context.job_applications())?;
    context.save()?;
    println!(
        "archive: examined {} archived {} failed {} ({})",
        report.examined,
        report.changed,
        report.failed,
        context.path().display()
    );
    Ok(())
}

pub(crate) fn run_certification(config: &AppConfig, args: BatchArgs) -> Result<(), AppError> {
    let context = BatchContext::open(config, args.store, args.today)?;
    let report = context.eligibility().certify_pending()?;
    context.save()?;
    println!(
        "certification: diagnoses {} certified {} not certified {} deferred {} skipped {} ({})",
        report.diagnoses,
        report.certified,
        report.not_certified,
        report.deferred,
        report.skipped,
        context.path().display()
    );
    Ok(())
}

use crate::jobs::{run_archive, run_auto_reject, run_certification, BatchArgs};
use clap::{Parser, Subcommand};
use pass_iae::config::AppConfig;
use pass_iae::error::AppError;
use pass_iae::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "pass-iae-batch",
    about = "Run the PASS IAE maintenance batches against a store snapshot",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refuse new or processing job applications left untouched for too long
    AutoRejectStaleApplications(BatchArgs),
    /// Archive old job applications in the archivable states
    ArchiveJobApplications(BatchArgs),
    /// Ask the registry to certify pending administrative criteria
    CertifyPendingCriteria(BatchArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::AutoRejectStaleApplications(args) => run_auto_reject(&config, args),
        Command::ArchiveJobApplications(args) => run_archive(&config, args),
        Command::CertifyPendingCriteria(args) => run_certification(&config, args),
    }
}

mod cli;
mod infra;
mod jobs;

use pass_iae::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}

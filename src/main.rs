use clap::Parser;
use stageflow::cli::{self, Args};
use stageflow::core::error::{AppError, ErrorReporter, StderrReporter};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let reporter = StderrReporter;

    let _logging = match stageflow::logging::init(&args.command, &args.path) {
        Ok(guard) => Some(guard),
        Err(err) => {
            reporter.report_warning(&format!("logging disabled: {err:#}"));
            None
        }
    };

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error = err
                .downcast::<AppError>()
                .unwrap_or_else(AppError::from);
            tracing::debug!(code = %error.code, "command failed");
            reporter.report_error(&error);
            ExitCode::FAILURE
        }
    }
}

use clap::Parser;
use routeguard::cli::{run_cli, Cli};
use routeguard::logging::{init_logging_with_config, LogConfig, LogWriter};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries command output
    let log_config = LogConfig::from_env().writer(LogWriter::Stderr);
    let _logging = match init_logging_with_config(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: {e:#}");
            None
        }
    };

    match run_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

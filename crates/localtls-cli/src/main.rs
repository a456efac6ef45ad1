//! localtls - local HTTPS certificates that browsers trust.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match localtls_cli::run().await {
        Ok(code) => code,
        Err(err) => {
            localtls_cli::cli::report_error(&err);
            ExitCode::FAILURE
        }
    }
}

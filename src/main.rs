use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    wishwatch::app::run().await
}

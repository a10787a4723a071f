use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use super::config::{Config, load_dotenv};
use super::crawl::{CrawlPlan, Pacer, crawl, crawl_and_publish};
use super::error::{CrawlError, Result};
use super::publish::{PublishReceipt, WebhookPublisher};
use super::spam::SpamFilter;
use super::types::{Cli, CrawlResult};
use super::webdriver::{BrowserLauncher, WebDriverLauncher};

pub async fn run() -> ExitCode {
    init_tracing();
    // before the CLI, so clap's `env` fallbacks see `.env` values
    match load_dotenv(None) {
        Ok(Some(path)) => debug!(path = %path.display(), ".env loaded"),
        Ok(None) => {}
        Err(err) => return report_failure(&err),
    }
    let cli = Cli::parse();

    match execute(&cli, |key| std::env::var(key).ok(), &WebDriverLauncher).await {
        Ok(Some(receipt)) => {
            println!(
                "Pushed results to provided endpoint. Response from the endpoint is provided below..."
            );
            println!("{receipt}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wishwatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_failure(err: &CrawlError) -> ExitCode {
    error!(stage = err.stage(), error = %err, "run aborted");
    eprintln!("wishwatch: {} stage failed: {err}", err.stage());
    ExitCode::FAILURE
}

/// One full run. Configuration is resolved before the browser is launched;
/// once launched it is shut down on every path out of here.
///
/// Returns `None` for a dry run, which prints the payload instead of
/// publishing it.
pub async fn execute<L>(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
    launcher: &L,
) -> Result<Option<PublishReceipt>>
where
    L: BrowserLauncher + ?Sized,
{
    let config = Config::resolve(cli, env)?;
    config.log_redacted();
    let spam = SpamFilter::new(&config.spam_keywords)?;
    let publisher = WebhookPublisher::new(config.push_url.clone())?;
    let plan = CrawlPlan::from(&config);
    let pacer = Pacer::new(config.request_delay);

    let browser = launcher.launch(&config).await?;

    let outcome = if config.dry_run {
        match crawl(&browser, &pacer, &plan, &spam).await {
            Ok(result) => print_payload(&result).map(|_| None),
            Err(err) => Err(err),
        }
    } else {
        crawl_and_publish(&browser, &publisher, &pacer, &plan, &spam)
            .await
            .map(Some)
    };

    launcher.shutdown(browser).await;
    if outcome.is_ok() {
        info!(paced_requests = pacer.paced(), "run complete");
    }
    outcome
}

fn print_payload(result: &CrawlResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| CrawlError::Publish(format!("payload serialization failed: {e}")))?;
    println!("{json}");
    Ok(())
}

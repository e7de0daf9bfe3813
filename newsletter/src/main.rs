//! Jellyfin newsletter - sends one digest of the latest Jellyfin items.
//!
//! Meant to be invoked by an external scheduler. Configuration and delivery
//! errors exit non-zero; an empty or unreachable listing exits cleanly.

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsletter::{run, Config, RunOutcome, SmtpMailer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("newsletter_starting");

    let config = Config::from_env().inspect_err(|e| {
        error!(error = %e, "config_invalid");
    })?;

    info!(
        api_url = %config.api_url,
        smtp_server = %config.smtp.host,
        smtp_port = config.smtp.port,
        recipients = config.smtp.recipients.len(),
        cache_dir = %config.cache_dir.display(),
        "config_loaded"
    );

    let mailer = SmtpMailer::from_config(&config.smtp).inspect_err(|e| {
        error!(error = %e, "mailer_invalid");
    })?;

    match run(&config, &mailer).await? {
        RunOutcome::NoItems => info!("newsletter_nothing_to_send"),
        RunOutcome::Delivered { items, images } => {
            info!(items = items, images = images, "newsletter_sent")
        }
    }

    Ok(())
}

//! One digest run: fetch, compose, dispatch.
//!
//! ```text
//! latest items → (none: done) → compose with cached artwork → mailer → done
//! ```
//!
//! Listing and image failures degrade the run; only setup and delivery
//! failures are returned as errors.

use std::io;
use std::path::PathBuf;

use reqwest::Client;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::ImageCache;
use crate::compose::compose;
use crate::config::Config;
use crate::jellyfin::{ClientError, JellyfinClient};
use crate::mailer::{MailError, Mailer};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("invalid Jellyfin client settings: {0}")]
    Client(#[from] ClientError),

    #[error("failed to create cache directories under {path}: {source}")]
    CacheDir { path: PathBuf, source: io::Error },

    #[error("delivery failed: {0}")]
    Delivery(#[from] MailError),
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The listing was empty or could not be fetched; nothing was sent.
    NoItems,
    /// A digest was handed to the mailer.
    Delivered { items: usize, images: usize },
}

/// Run the digest once.
pub async fn run(config: &Config, mailer: &dyn Mailer) -> Result<RunOutcome, RunError> {
    let client = Client::builder().build()?;

    let images = ImageCache::open(&config.cache_dir, client.clone(), config.request_timeout())
        .await
        .map_err(|source| RunError::CacheDir {
            path: config.cache_dir.clone(),
            source,
        })?;

    let server = JellyfinClient::new(client, config)?;

    let items = match server.latest_items().await {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "jellyfin_latest_fetch_failed");
            Vec::new()
        }
    };

    if items.is_empty() {
        info!("run_no_items");
        return Ok(RunOutcome::NoItems);
    }

    let message = compose(&items, &server, &images, &config.web_url).await;

    if let Err(e) = mailer.send(&message).await {
        error!(error = %e, "run_delivery_failed");
        return Err(RunError::Delivery(e));
    }

    let outcome = RunOutcome::Delivered {
        items: message.document.blocks.len(),
        images: message.parts.len(),
    };

    info!(
        items = message.document.blocks.len(),
        images = message.parts.len(),
        recipients = config.smtp.recipients.len(),
        "run_delivered"
    );

    Ok(outcome)
}

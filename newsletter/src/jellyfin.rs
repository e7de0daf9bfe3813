//! Jellyfin API access: the latest-items listing and image URL construction.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;

/// Marker separating the server root from the per-user listing path.
pub const USERS_PATH_MARKER: &str = "/Users/";

/// Server root used when the listing URL has no `/Users/` segment.
pub const FALLBACK_BASE_URL: &str = "http://localhost:8096";

/// Requested image width in pixels.
const IMAGE_MAX_WIDTH: u32 = 300;

/// Settings a [`JellyfinClient`] cannot be built from.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid authorization header: {0}")]
    InvalidToken(#[from] InvalidHeaderValue),

    #[error("invalid server base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed listing body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// One entry of the latest-items listing.
///
/// Only the fields the digest renders are kept; everything else is ignored.
/// A field holding anything other than a string is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Item {
    #[serde(rename = "Id", default, deserialize_with = "string_or_none")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "string_or_none")]
    pub name: Option<String>,
    #[serde(rename = "Type", default, deserialize_with = "string_or_none")]
    pub item_type: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Decode a listing body.
///
/// The body must be a JSON array. Entries that are not objects become empty
/// items (and are skipped later for lacking an id) rather than failing the
/// whole listing.
pub fn parse_items(body: &[u8]) -> Result<Vec<Item>, serde_json::Error> {
    let entries: Vec<Value> = serde_json::from_slice(body)?;

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry).unwrap_or_else(|e| {
                warn!(index = index, error = %e, "jellyfin_listing_entry_malformed");
                Item::default()
            })
        })
        .collect())
}

impl Item {
    /// The item id, treating an empty string as absent.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Artwork variants attached to each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Poster,
    Logo,
}

impl ImageKind {
    pub const ALL: [ImageKind; 2] = [ImageKind::Poster, ImageKind::Logo];

    /// Jellyfin image type in the `/Images/<type>` path segment.
    pub fn endpoint(self) -> &'static str {
        match self {
            ImageKind::Poster => "Primary",
            ImageKind::Logo => "Logo",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ImageKind::Poster => "poster",
            ImageKind::Logo => "logo",
        }
    }

    /// Cache subdirectory name.
    pub fn cache_dir(self) -> &'static str {
        match self {
            ImageKind::Poster => "posters",
            ImageKind::Logo => "logos",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Poster => "jpg",
            ImageKind::Logo => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Poster => "image/jpeg",
            ImageKind::Logo => "image/png",
        }
    }
}

/// Derive the server root from the configured listing URL.
///
/// Everything before the first `/Users/` is the root. Without the marker the
/// fixed [`FALLBACK_BASE_URL`] is returned.
pub fn server_base_url(api_url: &str) -> &str {
    match api_url.split_once(USERS_PATH_MARKER) {
        Some((base, _)) => base,
        None => FALLBACK_BASE_URL,
    }
}

/// Thin client over the two Jellyfin endpoints the digest uses.
#[derive(Debug, Clone)]
pub struct JellyfinClient {
    client: Client,
    api_url: String,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl JellyfinClient {
    pub fn new(client: Client, config: &Config) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&config.authorization())?);

        let base = server_base_url(&config.api_url);
        let base_url = Url::parse(base).map_err(|e| ClientError::InvalidBaseUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        Ok(Self {
            client,
            base_url,
            api_url: config.api_url.clone(),
            headers,
            timeout: config.request_timeout(),
        })
    }

    /// Headers every Jellyfin request carries.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL of one artwork variant for an item. The id is percent-encoded as a
    /// single path segment.
    pub fn image_url(&self, item_id: &str, kind: ImageKind) -> String {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base is hierarchical.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["Items", item_id, "Images", kind.endpoint()]);
        }
        url.query_pairs_mut()
            .append_pair("maxWidth", &IMAGE_MAX_WIDTH.to_string());
        url.into()
    }

    /// Fetch the latest-items listing.
    ///
    /// Returns exactly what the server lists, in server order.
    pub async fn latest_items(&self) -> Result<Vec<Item>, FetchError> {
        info!(url = %self.api_url, "jellyfin_latest_fetch_starting");

        let response = self
            .client
            .get(&self.api_url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        url = %self.api_url,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "jellyfin_latest_fetch_timeout"
                    );
                }
                FetchError::Request(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Request)?;
        let items = parse_items(&body).map_err(FetchError::Decode)?;

        info!(
            status_code = status.as_u16(),
            item_count = items.len(),
            "jellyfin_latest_fetch_complete"
        );

        Ok(items)
    }
}

//! Jellyfin newsletter - emails recently added media with inline artwork.
//!
//! ## Architecture
//!
//! ```text
//! Config → JellyfinClient (latest items) → ImageCache (posters/logos) → compose → Mailer
//! ```
//!
//! Everything runs sequentially: one request at a time, items in listing
//! order, poster before logo.

pub mod cache;
pub mod compose;
pub mod config;
pub mod jellyfin;
pub mod mailer;
pub mod pipeline;

// Re-export commonly used types
pub use cache::{CacheKey, CachedImage, ImageCache, ImageError, ImageSource};
pub use compose::{compose, ComposedMessage, Document, ImagePart, ItemBlock, MAX_ITEMS};
pub use config::{Config, ConfigError, SmtpConfig};
pub use jellyfin::{parse_items, server_base_url, ClientError, FetchError, ImageKind, Item, JellyfinClient};
pub use mailer::{MailError, Mailer, SmtpMailer};
pub use pipeline::{run, RunError, RunOutcome};

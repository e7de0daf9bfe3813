//! Digest composition: item blocks, the HTML document and inline image parts.
//!
//! ## Flow
//!
//! ```text
//! Items → (first 10 with an id) → ImageCache per kind → ItemBlock + ImageParts → ComposedMessage
//! ```

use std::collections::HashSet;
use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};
use tracing::{info, warn};

use crate::cache::{CacheKey, ImageCache, ImageError, ImageSource};
use crate::jellyfin::{ImageKind, Item, JellyfinClient};

/// Maximum number of listing entries considered per digest.
pub const MAX_ITEMS: usize = 10;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_TYPE: &str = "Unknown";

/// An image attached inline and referenced from the HTML by content id.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePart {
    pub content_id: String,
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

/// Rendered representation of one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemBlock {
    pub title: String,
    pub item_type: String,
    pub poster_cid: Option<String>,
    pub logo_cid: Option<String>,
}

impl ItemBlock {
    pub fn new(item: &Item) -> Self {
        Self {
            title: item.name.clone().unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            item_type: item.item_type.clone().unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            poster_cid: None,
            logo_cid: None,
        }
    }

    fn set_cid(&mut self, kind: ImageKind, cid: String) {
        match kind {
            ImageKind::Poster => self.poster_cid = Some(cid),
            ImageKind::Logo => self.logo_cid = Some(cid),
        }
    }

    pub fn render(&self, out: &mut String) {
        let title = encode_text(&self.title);
        let title_attr = encode_double_quoted_attribute(&self.title);

        out.push_str(
            r#"
        <div style="margin-bottom: 30px; padding: 15px; border: 1px solid #ddd; border-radius: 8px;">
            <div style="display: flex; gap: 15px; align-items: flex-start;">"#,
        );

        if let Some(cid) = &self.poster_cid {
            let _ = write!(
                out,
                r#"
                <div style="flex-shrink: 0;">
                    <img src="cid:{}" alt="Poster for {}" style="max-width: 150px; border-radius: 8px;">
                </div>"#,
                encode_double_quoted_attribute(cid),
                title_attr
            );
        }

        let _ = write!(
            out,
            r#"
                <div style="flex-grow: 1;">
                    <h3 style="margin: 0 0 10px 0; color: #333;">{}</h3>
                    <p style="margin: 0 0 10px 0; color: #666; font-size: 14px;">Type: {}</p>"#,
            title,
            encode_text(&self.item_type)
        );

        if let Some(cid) = &self.logo_cid {
            let _ = write!(
                out,
                r#"
                    <img src="cid:{}" alt="Logo for {}" style="max-width: 200px; margin-top: 10px;">"#,
                encode_double_quoted_attribute(cid),
                title_attr
            );
        }

        out.push_str(
            r#"
                </div>
            </div>
        </div>"#,
        );
    }
}

/// The digest body: a fixed shell around an ordered list of item blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub web_url: String,
    pub blocks: Vec<ItemBlock>,
}

impl Document {
    pub fn new(web_url: impl Into<String>) -> Self {
        Self {
            web_url: web_url.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: ItemBlock) {
        self.blocks.push(block);
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024 + self.blocks.len() * 768);

        let _ = write!(
            out,
            r#"<html>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; background-color: white; padding: 20px; border-radius: 10px;">
        <h1 style="color: #333; text-align: center;">New Content on Jellyfin!</h1>
        <p style="text-align: center; margin-bottom: 30px;">
            <a href="{}" style="color: #007bff; text-decoration: none;">Open Jellyfin</a>
        </p>"#,
            encode_double_quoted_attribute(&self.web_url)
        );

        for block in &self.blocks {
            block.render(&mut out);
        }

        out.push_str(
            r#"
    </div>
</body>
</html>
"#,
        );

        out
    }
}

/// A fully assembled digest ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMessage {
    pub document: Document,
    pub parts: Vec<ImagePart>,
}

impl ComposedMessage {
    pub fn html(&self) -> String {
        self.document.render()
    }
}

/// Content id linking an inline part to its `<img>`.
///
/// Ids outside `[A-Za-z0-9._-]` would break the `Content-ID` header or the
/// `cid:` reference, so they get no content id.
pub fn content_id(kind: ImageKind, item_id: &str) -> Option<String> {
    let token = item_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    token.then(|| format!("{}_{}", kind.label(), item_id))
}

/// Build the digest for `items`, resolving artwork through `images`.
///
/// Missing artwork is not an error: the block is rendered without it.
pub async fn compose(
    items: &[Item],
    server: &JellyfinClient,
    images: &ImageCache,
    web_url: &str,
) -> ComposedMessage {
    let mut document = Document::new(web_url);
    let mut parts: Vec<ImagePart> = Vec::new();
    let mut attached: HashSet<String> = HashSet::new();

    for item in items.iter().take(MAX_ITEMS) {
        let Some(item_id) = item.id() else {
            warn!(title = ?item.name, "compose_item_skipped_no_id");
            continue;
        };

        let mut block = ItemBlock::new(item);
        info!(title = %block.title, item_id = item_id, "compose_item_processing");

        for kind in ImageKind::ALL {
            let Some(cid) = content_id(kind, item_id) else {
                warn!(item_id = item_id, kind = kind.label(), "compose_image_skipped_unsafe_id");
                continue;
            };

            // Same item listed twice: point at the part already attached.
            if attached.contains(&cid) {
                block.set_cid(kind, cid);
                continue;
            }

            let url = server.image_url(item_id, kind);
            let key = CacheKey::new(kind, item_id);

            match images.fetch_or_load(&url, &key, server.headers()).await {
                Ok(image) => {
                    info!(
                        item_id = item_id,
                        kind = kind.label(),
                        from_cache = image.source == ImageSource::Cache,
                        size = image.bytes.len(),
                        "compose_image_attached"
                    );
                    attached.insert(cid.clone());
                    parts.push(ImagePart {
                        content_id: cid.clone(),
                        kind,
                        bytes: image.bytes,
                    });
                    block.set_cid(kind, cid);
                }
                Err(ImageError::NotAvailable(_)) => {
                    info!(item_id = item_id, kind = kind.label(), "compose_image_not_available");
                }
                Err(e) => {
                    warn!(
                        item_id = item_id,
                        kind = kind.label(),
                        url = %url,
                        error = %e,
                        "compose_image_failed"
                    );
                }
            }
        }

        document.push(block);
    }

    info!(
        blocks = document.blocks.len(),
        images = parts.len(),
        "compose_complete"
    );

    ComposedMessage { document, parts }
}

//! Image resources shared by a session's pages.
//!
//! Images are decoded once when they enter the session (to learn their pixel
//! size and reject undecodable bytes early) and embedded once at render time,
//! however many boxes reference them.

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::error::ImageError;

/// An encoded image together with its pixel dimensions.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub px_width: u32,
    pub px_height: u32,
}

/// Images referenced by [`ImageContent::image_id`](crate::layout_config::ImageContent).
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: Vec<(String, StoredImage)>,
}

impl ImageStore {
    /// Decode `bytes`, store them and return the new image id.
    pub fn insert(&mut self, bytes: Vec<u8>) -> Result<String, ImageError> {
        let decoded =
            ::image::load_from_memory(&bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
        let (px_width, px_height) = (decoded.width(), decoded.height());
        if px_width == 0 || px_height == 0 {
            return Err(ImageError::Decode("image has no pixels".to_string()));
        }
        let id = format!("img{}", self.images.len());
        self.images.push((
            id.clone(),
            StoredImage {
                bytes,
                px_width,
                px_height,
            },
        ));
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&StoredImage> {
        self.images
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, img)| img)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredImage)> {
        self.images.iter().map(|(id, img)| (id.as_str(), img))
    }

    /// Drop every image inserted after the store held `len` images.
    pub fn truncate(&mut self, len: usize) {
        self.images.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, ImageError> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        ImageError::Decode(format!(
            "image src must be a base64 data URI (e.g. `data:image/png;base64,...`), got {preview:?}"
        ))
    })?;
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        ImageError::Decode("invalid data URI: missing `,` between header and data".to_string())
    })?;
    if !header.contains(";base64") {
        return Err(ImageError::Decode(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STD
        .decode(cleaned)
        .map_err(|e| ImageError::Decode(format!("base64 decode error: {e}")))
}

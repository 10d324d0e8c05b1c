//! Image ingest service

use crate::{models::ImageRecord, store::ImageStore};
use anyhow::Result;
use log::info;

/// Service storing uploaded images verbatim
pub struct ImageService;

impl ImageService {
    /// Store `data` unconditionally; `content_type` falls back to
    /// `image/jpeg` when missing or empty
    pub async fn store_image<S: ImageStore>(
        store: &S,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<ImageRecord> {
        let image = store.insert(ImageRecord::new(data, content_type)).await?;

        info!(
            "stored image of {} bytes ({})",
            image.data.bytes.len(),
            image.content_type
        );

        Ok(image)
    }
}

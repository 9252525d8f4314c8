use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Raw image bytes plus the extension inferred from the data URI.
#[derive(Debug, PartialEq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Decode a `data:image/<ext>;base64,<payload>` URI.
pub fn decode_data_uri(data: &str) -> AppResult<DecodedImage> {
    let rest = data
        .strip_prefix("data:image/")
        .ok_or_else(|| AppError::Validation("image must be a base64 data URI".into()))?;

    let (extension, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| AppError::Validation("image must be a base64 data URI".into()))?;

    if extension.is_empty() {
        return Err(AppError::Validation("image type is missing".into()));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| AppError::Validation("image payload is not valid base64".into()))?;

    Ok(DecodedImage {
        bytes,
        extension: extension.to_string(),
    })
}

fn media_root() -> PathBuf {
    std::env::var("MEDIA_ROOT")
        .unwrap_or_else(|_| "media".to_string())
        .into()
}

/// Decode and persist a recipe image, returning the stored relative path.
/// The caller records that path; serving the file is not our concern.
pub async fn store_recipe_image(data_uri: &str) -> AppResult<String> {
    let image = decode_data_uri(data_uri)?;

    let relative = format!("recipes/images/{}.{}", Uuid::new_v4(), image.extension);
    let full = media_root().join(&relative);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("media dir: {e}")))?;
    }
    tokio::fs::write(&full, &image.bytes)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("media write: {e}")))?;

    Ok(relative)
}

/// Best-effort cleanup of a previously stored image.
pub async fn remove_image(relative: &str) {
    // Refuse anything that could escape the media root.
    if Path::new(relative).components().any(|c| {
        matches!(
            c,
            std::path::Component::ParentDir | std::path::Component::RootDir
        )
    }) {
        return;
    }
    let full = media_root().join(relative);
    if let Err(err) = tokio::fs::remove_file(&full).await {
        tracing::debug!(error = %err, path = %full.display(), "image cleanup skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_data_uri() {
        // "hi" in base64
        let decoded = decode_data_uri("data:image/png;base64,aGk=").unwrap();
        assert_eq!(decoded.extension, "png");
        assert_eq!(decoded.bytes, b"hi");
    }

    #[test]
    fn rejects_plain_string() {
        assert!(decode_data_uri("not-an-image").is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(decode_data_uri("data:image/jpeg;base64,???").is_err());
    }
}

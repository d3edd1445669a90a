use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::{config::Config, constants::IMAGE_TYPES, error::Error};

/// A decoded `data:image/<type>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn from_data_url(data: &str) -> Result<Self, Error> {
        let invalid = || Error::validation("Image must be a base64 encoded data URL");

        let rest = data.strip_prefix("data:").ok_or_else(invalid)?;
        let (mime, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;

        let extension = IMAGE_TYPES
            .iter()
            .find_map(|(kind, ext)| kind.eq_ignore_ascii_case(mime).then_some(*ext))
            .ok_or_else(|| Error::validation(format!("Unsupported image type {mime}")))?;

        let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
        if bytes.is_empty() {
            return Err(Error::validation("Image is empty"));
        }

        Ok(Self { extension, bytes })
    }
}

/// Directory uploaded recipe images are written to.
#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
}

impl MediaRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.media_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the image under `recipes/` with a random name and returns the
    /// path relative to the root.
    pub async fn save(&self, image: &ImageUpload) -> Result<String, Error> {
        let relative = format!("recipes/{}.{}", Uuid::new_v4(), image.extension);
        let path = self.root.join(&relative);

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Media(format!("{}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| Error::Media(format!("{}: {e}", path.display())))?;

        log::trace!("> Saved image {relative}");
        Ok(relative)
    }

    /// Deletes a file written by [`MediaRoot::save`]. Failures are only logged.
    pub async fn remove(&self, relative: &str) {
        let path = self.root.join(relative);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => log::trace!("> Removed image {relative}"),
            Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent png
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_png_data_url() {
        let image = ImageUpload::from_data_url(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(ImageUpload::from_data_url(PIXEL).is_err());
        assert!(ImageUpload::from_data_url("data:image/png,abc").is_err());
        assert!(ImageUpload::from_data_url("data:image/png;base64,!!!").is_err());
        assert!(matches!(
            ImageUpload::from_data_url(&format!("data:image/tiff;base64,{PIXEL}")),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn saves_under_recipes_dir() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", Uuid::new_v4()));
        let media = MediaRoot::new(&root);
        let image = ImageUpload::from_data_url(&format!("data:image/png;base64,{PIXEL}")).unwrap();

        let relative = media.save(&image).await.unwrap();
        assert!(relative.starts_with("recipes/") && relative.ends_with(".png"));

        let written = tokio::fs::read(media.root().join(&relative)).await.unwrap();
        assert_eq!(written, image.bytes);

        media.remove(&relative).await;
        assert!(!media.root().join(&relative).exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}

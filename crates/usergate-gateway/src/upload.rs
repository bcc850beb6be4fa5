//! Profile image uploads.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use usergate_core::Config;

/// Upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Content type is not an accepted image type.
    #[error("Only png, jpg and jpeg images are allowed, got '{0}'")]
    UnsupportedType(String),

    /// Body exceeds the size limit.
    #[error("The image must not exceed {max} bytes")]
    TooLarge {
        /// Configured limit.
        max: usize,
    },

    /// Writing or removing the file failed.
    #[error("Upload IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where images go and what is accepted.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    dir: PathBuf,
    max_bytes: usize,
    default_image: String,
}

impl ImagePolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        max_bytes: usize,
        default_image: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            default_image: default_image.into(),
        }
    }

    /// Policy from the `uploads` config section.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.upload_dir(),
            config.uploads.max_bytes,
            config.uploads.default_image.clone(),
        )
    }

    /// Maximum accepted size in bytes.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Image name for accounts without an upload.
    #[must_use]
    pub fn default_image(&self) -> &str {
        &self.default_image
    }

    /// Path of a stored image.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// File extension for an accepted content type.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::UnsupportedType` for anything but png and jpeg.
    pub fn extension_for(content_type: Option<&str>) -> Result<&'static str, UploadError> {
        let raw = content_type.unwrap_or_default();
        let mime = raw.split(';').next().unwrap_or_default().trim();
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Ok("png"),
            "image/jpg" => Ok("jpg"),
            "image/jpeg" => Ok("jpeg"),
            _ => Err(UploadError::UnsupportedType(raw.to_string())),
        }
    }

    /// Reject bodies over the limit.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::TooLarge` if `len > max_bytes`.
    pub const fn check_size(&self, len: usize) -> Result<(), UploadError> {
        if len > self.max_bytes {
            return Err(UploadError::TooLarge {
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Target file name: the current image when it is this account's prior
    /// upload with the same extension, otherwise `<account id>-<unix millis>.<ext>`.
    #[must_use]
    pub fn file_name(&self, account_id: &str, current: &str, ext: &str) -> String {
        let prefix = format!("{account_id}-");
        let reusable = current != self.default_image
            && current.starts_with(&prefix)
            && Path::new(current)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if reusable {
            current.to_string()
        } else {
            format!("{prefix}{}.{ext}", Utc::now().timestamp_millis())
        }
    }

    /// Write an upload with extension `ext`, returning the stored file name.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::TooLarge` over the limit, or `UploadError::Io`
    /// if the write fails.
    pub async fn store(
        &self,
        account_id: &str,
        current: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<String, UploadError> {
        self.check_size(bytes.len())?;

        let name = self.file_name(account_id, current, ext);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(&name), bytes).await?;
        tracing::debug!(file = %name, size = bytes.len(), "Image stored");
        Ok(name)
    }

    /// Remove a stored image. The default image is never removed.
    pub async fn discard(&self, name: &str) {
        if name == self.default_image {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(self.path(name)).await {
            tracing::warn!(file = %name, error = %e, "Failed to remove image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEFAULT: &str = "default-user-icon.jpg";

    fn policy(dir: &TempDir) -> ImagePolicy {
        ImagePolicy::new(dir.path(), 16, DEFAULT)
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(ImagePolicy::extension_for(Some("image/png")).unwrap(), "png");
        assert_eq!(ImagePolicy::extension_for(Some("image/jpg")).unwrap(), "jpg");
        assert_eq!(
            ImagePolicy::extension_for(Some("IMAGE/JPEG; charset=binary")).unwrap(),
            "jpeg"
        );
        assert!(matches!(
            ImagePolicy::extension_for(Some("image/gif")),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(ImagePolicy::extension_for(None).is_err());
    }

    #[test]
    fn test_file_name() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir);

        assert_eq!(policy.file_name("u1", "u1-1700000000000.png", "png"), "u1-1700000000000.png");
        let fresh = policy.file_name("u1", DEFAULT, "png");
        assert!(fresh.starts_with("u1-"));
        assert!(fresh.ends_with(".png"));
        assert!(policy.file_name("u1", "u1-1700000000000.png", "jpeg").ends_with(".jpeg"));
    }

    #[test]
    fn test_file_name_never_reuses_another_accounts_image() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir);

        let name = policy.file_name("u2", "u1-1700000000000.png", "png");
        assert_ne!(name, "u1-1700000000000.png");
        assert!(name.starts_with("u2-"));
    }

    #[tokio::test]
    async fn test_same_millisecond_uploads_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir);

        let (first, second) = tokio::join!(
            policy.store("u1", DEFAULT, "png", b"first"),
            policy.store("u2", DEFAULT, "png", b"second"),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);
        assert_eq!(std::fs::read(policy.path(&first)).unwrap(), b"first");
        assert_eq!(std::fs::read(policy.path(&second)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_store_and_discard() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir);

        let name = policy.store("u1", DEFAULT, "png", b"png-bytes").await.unwrap();
        assert!(policy.path(&name).exists());

        policy.discard(&name).await;
        assert!(!policy.path(&name).exists());
    }

    #[tokio::test]
    async fn test_store_rejects_oversized() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir);

        assert!(matches!(
            policy.store("u1", DEFAULT, "png", &[0u8; 17]).await,
            Err(UploadError::TooLarge { max: 16 })
        ));
    }
}

//! Avatar validation and background thumbnail generation.

use crate::error::{SocialAuthError, SocialAuthResult};
use image::{ImageFormat, ImageReader};
use ras_identity_core::{UserField, UserStore};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Image handling the pipeline delegates to the host.
pub trait ImagePipeline: Send + Sync {
    /// Reject bytes that are not a decodable image of `content_type`.
    fn validate_image(&self, content: &[u8], content_type: &str) -> SocialAuthResult<()>;

    /// Queue thumbnail generation for the user's avatar. Never blocks and
    /// never fails the caller.
    fn schedule_avatar_thumbnails(&self, user_id: Uuid);
}

/// Storage name for an avatar: the email without `@` and `.`, a content hash
/// and the content type's subtype as extension.
pub fn avatar_filename(email: &str, content_type: &str, content: &[u8]) -> String {
    let stem: String = email.chars().filter(|c| *c != '@' && *c != '.').collect();
    let extension = content_type
        .split(';')
        .next()
        .and_then(|mime| mime.split('/').nth(1))
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    let digest = format!("{:x}", Sha256::digest(content));

    format!("{stem}_{}.{extension}", &digest[..8])
}

pub fn check_image(content: &[u8], content_type: &str) -> SocialAuthResult<()> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    let declared = ImageFormat::from_mime_type(mime).ok_or_else(|| {
        SocialAuthError::Validation(format!("unsupported image content type `{content_type}`"))
    })?;

    let reader = ImageReader::new(Cursor::new(content))
        .with_guessed_format()
        .map_err(|e| SocialAuthError::Validation(format!("failed to read image: {e}")))?;

    match reader.format() {
        Some(actual) if actual == declared => {}
        Some(actual) => {
            return Err(SocialAuthError::Validation(format!(
                "image data is {actual:?} but was served as `{content_type}`"
            )));
        }
        None => {
            return Err(SocialAuthError::Validation(
                "unrecognised image data".to_string(),
            ));
        }
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| SocialAuthError::Validation(format!("failed to decode image: {e}")))?;

    if width == 0 || height == 0 {
        return Err(SocialAuthError::Validation("image has no pixels".to_string()));
    }

    Ok(())
}

/// [`ImagePipeline`] that validates with the `image` crate and hands thumbnail
/// jobs to a [`ThumbnailWorker`] over a bounded channel. Jobs beyond the
/// channel capacity are dropped with a warning.
#[derive(Clone)]
pub struct ThumbnailQueue {
    sender: mpsc::Sender<Uuid>,
}

impl ThumbnailQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Start a worker on the current tokio runtime and return its queue.
    pub fn spawn(store: Arc<dyn UserStore>, sizes: Vec<u32>, capacity: usize) -> Self {
        let (queue, receiver) = Self::channel(capacity);
        let worker = ThumbnailWorker::new(store, sizes);
        tokio::spawn(worker.run(receiver));
        queue
    }
}

impl ImagePipeline for ThumbnailQueue {
    fn validate_image(&self, content: &[u8], content_type: &str) -> SocialAuthResult<()> {
        check_image(content, content_type)
    }

    fn schedule_avatar_thumbnails(&self, user_id: Uuid) {
        match self.sender.try_send(user_id) {
            Ok(()) => debug!("Queued avatar thumbnails for user {}", user_id),
            Err(TrySendError::Full(_)) => {
                warn!("Thumbnail queue is full, skipping thumbnails for user {}", user_id)
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Thumbnail worker is gone, skipping thumbnails for user {}", user_id)
            }
        }
    }
}

pub struct ThumbnailWorker {
    store: Arc<dyn UserStore>,
    sizes: Vec<u32>,
}

impl ThumbnailWorker {
    pub fn new(store: Arc<dyn UserStore>, sizes: Vec<u32>) -> Self {
        Self { store, sizes }
    }

    pub async fn run(self, mut receiver: mpsc::Receiver<Uuid>) {
        while let Some(user_id) = receiver.recv().await {
            match self.process(user_id).await {
                Ok(count) => info!("Generated {} avatar thumbnails for user {}", count, user_id),
                Err(e) => warn!("Avatar thumbnails failed for user {}: {}", user_id, e),
            }
        }
        debug!("Thumbnail queue closed");
    }

    /// Generate every configured size for the user's avatar and store them.
    pub async fn process(&self, user_id: Uuid) -> SocialAuthResult<usize> {
        let mut user = self.store.get(user_id).await?;
        let Some(avatar) = user.avatar.as_mut() else {
            return Ok(0);
        };

        let image = image::load_from_memory(&avatar.content)
            .map_err(|e| SocialAuthError::Validation(format!("failed to decode avatar: {e}")))?;

        for &size in &self.sizes {
            let mut buffer = Vec::new();
            image
                .thumbnail(size, size)
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| SocialAuthError::Validation(format!("failed to encode thumbnail: {e}")))?;
            avatar.thumbnails.insert(size, buffer);
        }

        let count = avatar.thumbnails.len();
        self.store.save(&user, &[UserField::Avatar]).await?;
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ras_identity_core::{Avatar, InMemoryUserStore};
    use std::collections::BTreeMap;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_avatar_filename() {
        let name = avatar_filename("john@doe.com", "image/jpeg", b"image");
        assert!(name.starts_with("johndoecom_"));
        assert!(name.ends_with(".jpeg"));
        assert_eq!(name.len(), "johndoecom_".len() + 8 + ".jpeg".len());

        let other = avatar_filename("john@doe.com", "image/jpeg", b"other image");
        assert_ne!(name, other);
    }

    #[test]
    fn test_avatar_filename_strips_mime_parameters() {
        let name = avatar_filename("a@b.c", "image/png; charset=binary", b"x");
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_check_image_accepts_png() {
        assert!(check_image(&png_bytes(4, 4), "image/png").is_ok());
    }

    #[test]
    fn test_check_image_rejects_garbage_and_mismatch() {
        assert!(matches!(
            check_image(b"definitely not an image", "image/png"),
            Err(SocialAuthError::Validation(_))
        ));
        assert!(matches!(
            check_image(&png_bytes(4, 4), "image/jpeg"),
            Err(SocialAuthError::Validation(_))
        ));
        assert!(matches!(
            check_image(&png_bytes(4, 4), "text/html"),
            Err(SocialAuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_generates_thumbnails() {
        let store = Arc::new(InMemoryUserStore::new());
        let (mut user, _) = store
            .get_or_create("john@doe.com", Some("John"), Some("Doe"))
            .await
            .unwrap();
        user.avatar = Some(Avatar {
            filename: "johndoecom_deadbeef.png".to_string(),
            content_type: "image/png".to_string(),
            content: png_bytes(300, 200),
            thumbnails: BTreeMap::new(),
        });
        store.save(&user, &[UserField::Avatar]).await.unwrap();

        let worker = ThumbnailWorker::new(store.clone(), vec![32, 64]);
        assert_eq!(worker.process(user.id).await.unwrap(), 2);

        let stored = store.get(user.id).await.unwrap();
        let thumbnails = &stored.avatar.unwrap().thumbnails;
        let small = image::load_from_memory(&thumbnails[&32]).unwrap();
        assert!(small.width() <= 32 && small.height() <= 32);
    }

    #[tokio::test]
    async fn test_closed_queue_does_not_panic() {
        let (queue, receiver) = ThumbnailQueue::channel(4);
        drop(receiver);
        queue.schedule_avatar_thumbnails(Uuid::new_v4());
    }

    #[tokio::test]
    async fn test_full_queue_drops_jobs_without_blocking() {
        let (queue, mut receiver) = ThumbnailQueue::channel(1);
        let first = Uuid::new_v4();

        queue.schedule_avatar_thumbnails(first);
        queue.schedule_avatar_thumbnails(Uuid::new_v4());

        assert_eq!(receiver.try_recv().unwrap(), first);
        assert!(receiver.try_recv().is_err());
    }
}

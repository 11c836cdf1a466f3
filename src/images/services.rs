use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::processing::{
    check_image_file, mime_type_for, normalize_image, validate_image_file, ImageValidationError,
    NormalizedImage,
};
use super::repo;
use super::repo_types::{FoodImage, ImageSource, NewFoodImage};
use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::StorageClient;

const MAX_ORIGINAL_FILENAME: usize = 255;

#[derive(Debug)]
pub struct SavedImage {
    pub filename: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

/// Validates, normalizes and writes an upload under a random name.
/// Nothing reaches the storage unless validation passed.
pub async fn save_image(
    storage: &dyn StorageClient,
    cfg: &UploadConfig,
    content: Bytes,
    original_filename: &str,
) -> ApiResult<SavedImage> {
    let cfg = cfg.clone();
    let name = original_filename.to_string();
    let normalized = tokio::task::spawn_blocking(move || -> ApiResult<NormalizedImage> {
        if !validate_image_file(&content, &name, &cfg) {
            // second pass only on rejection, to name the rule that failed
            let reason = check_image_file(&content, &name, &cfg)
                .err()
                .unwrap_or(ImageValidationError::Undecodable);
            return Err(reason.into());
        }
        normalize_image(&content, &name, &cfg).map_err(ApiError::Internal)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::Error::from(e).context("image worker")))??;

    let filename = format!("{}.{}", Uuid::new_v4().simple(), normalized.format.extension());
    let file_size = normalized.bytes.len() as u64;
    let file_path = storage
        .put_object(&filename, Bytes::from(normalized.bytes))
        .await
        .map_err(ApiError::Storage)?;

    Ok(SavedImage {
        mime_type: mime_type_for(&filename),
        filename,
        file_path,
        file_size,
        width: normalized.width,
        height: normalized.height,
    })
}

/// Client-supplied name, stripped of directories and bounded for the column.
fn display_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original);
    base.chars().take(MAX_ORIGINAL_FILENAME).collect()
}

pub async fn create_food_image(
    st: &AppState,
    user_id: Uuid,
    content: Bytes,
    original_filename: &str,
    source: ImageSource,
) -> ApiResult<FoodImage> {
    let saved = save_image(
        st.storage.as_ref(),
        &st.config.upload,
        content,
        original_filename,
    )
    .await?;

    let original = display_filename(original_filename);
    let file_path = saved.file_path.to_string_lossy();
    let new = NewFoodImage {
        user_id,
        filename: &saved.filename,
        original_filename: &original,
        file_path: &file_path,
        file_size: saved.file_size as i64,
        mime_type: saved.mime_type,
        source,
        width: saved.width as i32,
        height: saved.height as i32,
    };

    match repo::insert_image(&st.db, &new).await {
        Ok(image) => {
            info!(image_id = %image.id, %user_id, width = saved.width, height = saved.height, "food image stored");
            Ok(image)
        }
        Err(e) => {
            // the row never existed, so the file is an orphan
            if let Err(cleanup) = st.storage.delete_object(&saved.filename).await {
                warn!(error = %cleanup, filename = %saved.filename, "orphan cleanup failed");
            }
            Err(ApiError::Internal(e))
        }
    }
}

pub async fn list_user_images(
    st: &AppState,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> ApiResult<Vec<FoodImage>> {
    Ok(repo::list_by_user(&st.db, user_id, limit, offset).await?)
}

pub async fn get_user_image(st: &AppState, image_id: Uuid, user_id: Uuid) -> ApiResult<FoodImage> {
    repo::find_for_user(&st.db, image_id, user_id)
        .await?
        .ok_or(ApiError::NotFound("Image not found"))
}

pub async fn read_image_bytes(st: &AppState, image: &FoodImage) -> anyhow::Result<Bytes> {
    st.storage
        .get_object(&image.filename)
        .await
        .with_context(|| format!("read stored image {}", image.id))
}

/// Path of a stored image if the file is still there.
pub async fn get_image_path(storage: &dyn StorageClient, filename: &str) -> Option<PathBuf> {
    if storage.exists(filename).await {
        Some(storage.object_path(filename))
    } else {
        None
    }
}

/// Removes the file and the row. Only the owner may delete; returns false otherwise.
pub async fn delete_food_image(st: &AppState, image_id: Uuid, user_id: Uuid) -> ApiResult<bool> {
    let Some(image) = repo::find_for_user(&st.db, image_id, user_id).await? else {
        return Ok(false);
    };

    if let Err(e) = st.storage.delete_object(&image.filename).await {
        warn!(error = %e, %image_id, "failed to delete image file");
    }
    let deleted = repo::delete_image(&st.db, image.id).await?;
    info!(%image_id, %user_id, deleted, "food image deleted");
    Ok(deleted)
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::images::processing::test_images::{jpeg, rgba_png, webp};
    use crate::storage::LocalStorage;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn save_image_writes_normalized_copy() {
        let (_dir, storage) = storage();
        let saved = save_image(
            &storage,
            &UploadConfig::default(),
            Bytes::from(jpeg(100, 100)),
            "original.jpg",
        )
        .await
        .unwrap();

        assert!(saved.filename.ends_with(".jpg"));
        assert_eq!(saved.filename.len(), 36); // uuid hex + extension
        assert!(saved.file_path.exists());
        assert!(saved.file_size > 0);
        assert_eq!((saved.width, saved.height), (100, 100));
        assert_eq!(saved.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn save_image_bounds_dimensions() {
        let (_dir, storage) = storage();
        let cfg = UploadConfig {
            max_dimension: 50,
            ..UploadConfig::default()
        };
        let saved = save_image(&storage, &cfg, Bytes::from(jpeg(120, 80)), "large.jpeg")
            .await
            .unwrap();
        assert!(saved.width <= 50 && saved.height <= 50);

        let on_disk = image::open(&saved.file_path).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&on_disk), (saved.width, saved.height));
    }

    #[tokio::test]
    async fn save_image_drops_alpha() {
        let (_dir, storage) = storage();
        let saved = save_image(
            &storage,
            &UploadConfig::default(),
            Bytes::from(rgba_png(16, 16)),
            "transparent.png",
        )
        .await
        .unwrap();
        let on_disk = image::open(&saved.file_path).unwrap();
        assert!(!on_disk.color().has_alpha());
    }

    #[tokio::test]
    async fn save_image_keeps_webp() {
        let (_dir, storage) = storage();
        let saved = save_image(
            &storage,
            &UploadConfig::default(),
            Bytes::from(webp(8, 8)),
            "meal.webp",
        )
        .await
        .unwrap();
        assert!(saved.filename.ends_with(".webp"));
        assert_eq!(saved.mime_type, "image/webp");
        let on_disk = std::fs::read(&saved.file_path).unwrap();
        assert_eq!(image::guess_format(&on_disk).unwrap(), image::ImageFormat::WebP);
    }

    #[tokio::test]
    async fn rejected_uploads_write_nothing() {
        let (dir, storage) = storage();
        let cfg = UploadConfig {
            max_bytes: 64,
            ..UploadConfig::default()
        };

        let too_big = save_image(&storage, &cfg, Bytes::from(jpeg(100, 100)), "a.jpg").await;
        assert!(matches!(too_big, Err(ApiError::Validation(m)) if m.starts_with("file is too large")));

        let wrong_ext = save_image(&storage, &UploadConfig::default(), Bytes::from(jpeg(4, 4)), "a.txt").await;
        assert!(matches!(wrong_ext, Err(ApiError::Validation(m)) if m.contains("unsupported file extension")));

        let corrupt = save_image(&storage, &UploadConfig::default(), Bytes::from_static(b"nope"), "a.png").await;
        assert!(matches!(corrupt, Err(ApiError::Validation(m)) if m == "file is not a readable image"));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn image_path_lookup() {
        let (_dir, storage) = storage();
        let saved = save_image(
            &storage,
            &UploadConfig::default(),
            Bytes::from(jpeg(8, 8)),
            "path_test.jpg",
        )
        .await
        .unwrap();

        assert_eq!(get_image_path(&storage, &saved.filename).await, Some(saved.file_path.clone()));
        assert_eq!(get_image_path(&storage, "nonexistent.jpg").await, None);

        storage.delete_object(&saved.filename).await.unwrap();
        assert!(!saved.file_path.exists());
        assert_eq!(get_image_path(&storage, &saved.filename).await, None);
    }

    #[test]
    fn display_filename_strips_directories() {
        assert_eq!(display_filename("../../etc/lunch.jpg"), "lunch.jpg");
        assert_eq!(display_filename("plain.png"), "plain.png");
        assert_eq!(display_filename(&format!("{}.jpg", "a".repeat(300))).len(), 255);
    }
}

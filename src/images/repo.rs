use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::images::repo_types::{FoodImage, FoodImageRow, NewFoodImage};

/// Insert a new image row.
pub async fn insert_image(db: &PgPool, new: &NewFoodImage<'_>) -> anyhow::Result<FoodImage> {
    let row = sqlx::query_as::<_, FoodImageRow>(
        r#"
        INSERT INTO food_images
            (user_id, filename, original_filename, file_path, file_size,
             mime_type, source_type, width, height)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, user_id, filename, original_filename, file_size,
                  mime_type, source_type, width, height, created_at
        "#,
    )
    .bind(new.user_id)
    .bind(new.filename)
    .bind(new.original_filename)
    .bind(new.file_path)
    .bind(new.file_size)
    .bind(new.mime_type)
    .bind(new.source.as_str())
    .bind(new.width)
    .bind(new.height)
    .fetch_one(db)
    .await
    .context("insert food image")?;

    Ok(row.into())
}

// ---- Queries ----

pub async fn find_by_id(db: &PgPool, image_id: Uuid) -> anyhow::Result<Option<FoodImage>> {
    let row = sqlx::query_as::<_, FoodImageRow>(
        r#"
        SELECT id, user_id, filename, original_filename, file_size,
               mime_type, source_type, width, height, created_at
          FROM food_images
         WHERE id = $1
        "#,
    )
    .bind(image_id)
    .fetch_optional(db)
    .await
    .context("get food image")?;

    Ok(row.map(FoodImage::from))
}

/// Same as [`find_by_id`] but only if `user_id` owns the image.
pub async fn find_for_user(
    db: &PgPool,
    image_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<FoodImage>> {
    let row = sqlx::query_as::<_, FoodImageRow>(
        r#"
        SELECT id, user_id, filename, original_filename, file_size,
               mime_type, source_type, width, height, created_at
          FROM food_images
         WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(image_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get food image for user")?;

    Ok(row.map(FoodImage::from))
}

/// A user's images, most recent first.
pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<FoodImage>> {
    let rows = sqlx::query_as::<_, FoodImageRow>(
        r#"
        SELECT id, user_id, filename, original_filename, file_size,
               mime_type, source_type, width, height, created_at
          FROM food_images
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list food images by user")?;

    Ok(rows.into_iter().map(FoodImage::from).collect())
}

/// Deletes the row (analysis and detections cascade). Returns whether a row was removed.
pub async fn delete_image(db: &PgPool, image_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM food_images WHERE id = $1")
        .bind(image_id)
        .execute(db)
        .await
        .context("delete food image")?;
    Ok(res.rows_affected() > 0)
}

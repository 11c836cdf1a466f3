use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Where the photo came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    #[default]
    Upload,
    Camera,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSource::Upload => "upload",
            ImageSource::Camera => "camera",
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(ImageSource::Upload),
            "camera" => Ok(ImageSource::Camera),
            other => anyhow::bail!("unknown image source {other:?}"),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct FoodImageRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub source_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub created_at: OffsetDateTime,
}

/// Stored image metadata. The file itself is addressed through storage by `filename`.
#[derive(Debug, Clone, Serialize)]
pub struct FoodImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub source_type: ImageSource,
    pub width: Option<i32>,
    pub height: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FoodImageRow> for FoodImage {
    fn from(r: FoodImageRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            filename: r.filename,
            original_filename: r.original_filename,
            file_size: r.file_size,
            mime_type: r.mime_type,
            source_type: r.source_type.parse().unwrap_or_default(),
            width: r.width,
            height: r.height,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug)]
pub struct NewFoodImage<'a> {
    pub user_id: Uuid,
    pub filename: &'a str,
    pub original_filename: &'a str,
    pub file_path: &'a str,
    pub file_size: i64,
    pub mime_type: &'a str,
    pub source: ImageSource,
    pub width: i32,
    pub height: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_json_has_no_disk_location() {
        let image = FoodImage::from(FoodImageRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: "3f2a.jpg".into(),
            original_filename: "lunch.jpg".into(),
            file_size: 1024,
            mime_type: "image/jpeg".into(),
            source_type: "CAMERA".into(),
            width: Some(640),
            height: Some(480),
            created_at: OffsetDateTime::now_utc(),
        });
        assert_eq!(image.source_type, ImageSource::Camera);

        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["filename"], "3f2a.jpg");
        assert!(json.get("file_path").is_none());
    }

    #[test]
    fn unknown_source_falls_back_to_upload() {
        assert_eq!("scanner".parse::<ImageSource>().ok(), None);
        assert_eq!(
            "scanner".parse::<ImageSource>().unwrap_or_default(),
            ImageSource::Upload
        );
    }
}

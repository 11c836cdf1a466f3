use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_bytes: 10 * 1024 * 1024, // 10MB
            max_dimension: 2048,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub upload: UploadConfig,
    pub classifier_model: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
            max_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_bytes),
            max_dimension: env_parse("MAX_IMAGE_DIMENSION").unwrap_or(defaults.max_dimension),
            jpeg_quality: env_parse::<u8>("JPEG_QUALITY")
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
        };
        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
            upload,
            classifier_model: std::env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "food-vision-ai".into()),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_defaults_match_service_limits() {
        let cfg = UploadConfig::default();
        assert_eq!(cfg.max_bytes, 10_485_760);
        assert_eq!(cfg.max_dimension, 2048);
        assert_eq!(cfg.jpeg_quality, 85);
        assert_eq!(cfg.dir, PathBuf::from("uploads"));
    }

    #[test]
    fn env_parse_ignores_garbage() {
        std::env::set_var("NUTRILENS_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parse::<u32>("NUTRILENS_TEST_GARBAGE"), None);
        std::env::set_var("NUTRILENS_TEST_NUMBER", "42");
        assert_eq!(env_parse::<u32>("NUTRILENS_TEST_NUMBER"), Some(42));
    }
}

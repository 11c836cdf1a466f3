use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    analysis::{self, view::AnalysisView},
    config::UploadConfig,
    error::{ApiError, ApiResult},
    images::{
        dto::{ImageDetails, Pagination},
        repo_types::{FoodImage, ImageSource},
        services,
    },
    state::AppState,
    users::CurrentUser,
};

// multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn image_routes(cfg: &UploadConfig) -> Router<AppState> {
    Router::new()
        .route("/images", post(upload_image).get(list_images))
        .route("/images/:id", get(get_image).delete(delete_image))
        .route("/images/:id/file", get(get_image_file))
        .route("/images/:id/analysis", post(reanalyze_image))
        .layer(DefaultBodyLimit::max(cfg.max_bytes + MULTIPART_OVERHEAD))
}

#[derive(Debug)]
pub(crate) struct UploadForm {
    pub filename: String,
    pub content: Bytes,
    pub source: ImageSource,
}

/// Reads the `file` part (required) and the `source` part (optional) of an upload.
pub(crate) async fn read_upload_form(mut mp: Multipart) -> ApiResult<UploadForm> {
    let mut file: Option<(String, Bytes)> = None;
    let mut source = ImageSource::default();

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| ApiError::Validation("No file provided".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                file = Some((filename, data));
            }
            Some("source") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                source = raw
                    .parse()
                    .map_err(|_| ApiError::Validation(format!("invalid source {raw:?}")))?;
            }
            _ => {}
        }
    }

    let (filename, content) = file.ok_or_else(|| ApiError::Validation("No file provided".into()))?;
    if content.is_empty() {
        return Err(ApiError::Validation("Uploaded file is empty".into()));
    }
    Ok(UploadForm {
        filename,
        content,
        source,
    })
}

async fn details(state: &AppState, image: FoodImage) -> ApiResult<ImageDetails> {
    let analysis = analysis::services::get_analysis_for_image(state, image.id).await?;
    Ok(ImageDetails {
        image,
        analysis: analysis.as_ref().map(AnalysisView::from),
    })
}

/// POST /images (multipart). Stores the photo, then analyses it right away.
#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Multipart,
) -> ApiResult<(StatusCode, HeaderMap, Json<ImageDetails>)> {
    let form = read_upload_form(mp).await?;
    let image =
        services::create_food_image(&state, user.id, form.content, &form.filename, form.source)
            .await?;

    // the upload itself succeeded; a broken analysis run must not undo it
    let analysis = match analysis::services::analyze_food_image(&state, image.id).await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, image_id = %image.id, "analysis after upload failed");
            None
        }
    };
    info!(image_id = %image.id, analysed = analysis.is_some(), "upload handled");

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/api/v1/images/{}", image.id))
        .map_err(|e| ApiError::Internal(e.into()))?;
    headers.insert(header::LOCATION, location);

    Ok((
        StatusCode::CREATED,
        headers,
        Json(ImageDetails {
            image,
            analysis: analysis.as_ref().map(AnalysisView::from),
        }),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_images(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<Vec<FoodImage>>> {
    let images = services::list_user_images(&state, user.id, p.limit(), p.offset()).await?;
    Ok(Json(images))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ImageDetails>> {
    let image = services::get_user_image(&state, id, user.id).await?;
    Ok(Json(details(&state, image).await?))
}

/// Raw stored bytes, served with the stored MIME type.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_image_file(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let image = services::get_user_image(&state, id, user.id).await?;
    if services::get_image_path(state.storage.as_ref(), &image.filename)
        .await
        .is_none()
    {
        warn!(image_id = %id, "image row without file");
        return Err(ApiError::NotFound("Image file not found"));
    }
    let bytes = services::read_image_bytes(&state, &image)
        .await
        .map_err(ApiError::Storage)?;
    Ok(([(header::CONTENT_TYPE, image.mime_type)], bytes))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if services::delete_food_image(&state, id, user.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Image not found"))
    }
}

/// Runs the classifier again; the previous result is replaced.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn reanalyze_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalysisView>> {
    let image = services::get_user_image(&state, id, user.id).await?;
    let full = analysis::services::analyze_food_image(&state, image.id)
        .await?
        .ok_or(ApiError::NotFound("Image not found"))?;
    Ok(Json(AnalysisView::from(&full)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn parse(req: Request<Body>) -> ApiResult<UploadForm> {
        let mp = Multipart::from_request(req, &()).await.unwrap();
        read_upload_form(mp).await
    }

    #[tokio::test]
    async fn reads_file_and_source() {
        let form = parse(multipart(&[
            ("source", None, b"Camera"),
            ("file", Some("lunch.jpg"), b"\xff\xd8\xff"),
        ]))
        .await
        .unwrap();
        assert_eq!(form.filename, "lunch.jpg");
        assert_eq!(&form.content[..], b"\xff\xd8\xff");
        assert_eq!(form.source, ImageSource::Camera);
    }

    #[tokio::test]
    async fn source_defaults_to_upload() {
        let form = parse(multipart(&[("file", Some("a.png"), b"data")]))
            .await
            .unwrap();
        assert_eq!(form.source, ImageSource::Upload);
    }

    #[tokio::test]
    async fn missing_or_empty_file_is_rejected() {
        let err = parse(multipart(&[("source", None, b"upload")])).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(m) if m == "No file provided"));

        let err = parse(multipart(&[("file", Some("a.jpg"), b"")])).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let err = parse(multipart(&[
            ("file", Some("a.jpg"), b"data"),
            ("source", None, b"scanner"),
        ]))
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}

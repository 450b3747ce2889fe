use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::Created;
use crate::app::AppState;
use crate::domain::{is_supported_model_file, UploadedModel, ValidationError};
use crate::error::{ApiError, ApiResult};

/// Store a model file and return a reference for order creation
pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Created<UploadedModel>> {
    let max_bytes = state.settings.max_upload_bytes;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no name"))?;
        if !is_supported_model_file(&file_name) {
            return Err(ValidationError::UnsupportedFile(file_name).into());
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        if data.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Model files are limited to {} bytes",
                max_bytes
            )));
        }

        let file_ref = format!("{}_{}", Uuid::new_v4(), file_name);
        let dir = &state.settings.upload_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("create upload dir: {}", e)))?;
        tokio::fs::write(dir.join(&file_ref), &data)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("write upload: {}", e)))?;

        tracing::info!(
            file_ref = %file_ref,
            size_bytes = data.len(),
            "Model uploaded"
        );

        return Ok(Created(UploadedModel {
            file_ref,
            file_name,
            size_bytes: data.len() as u64,
        }));
    }

    Err(ApiError::bad_request("Missing multipart field 'file'"))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Location of a `file_ref` issued by [`upload_model`]. Anything other than a
/// single plain file name is refused.
pub(crate) fn stored_upload_path(dir: &Path, file_ref: &str) -> Option<PathBuf> {
    let mut components = Path::new(file_ref).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(dir.join(name)),
        _ => None,
    }
}

/// Final path component with anything outside `[A-Za-z0-9._-]` replaced.
fn sanitize_file_name(raw: &str) -> String {
    let base = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

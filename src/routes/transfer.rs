//! File transfer endpoints
//!
//! Endpoints:
//! - POST /file-transfer/upload - Multipart upload, dispatched as chunks
//! - GET /file-transfer/download/:file_name - Stream a reassembled file

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{Result, TransferError};
use crate::state::AppState;
use crate::transfer::original_extension;

/// Create the file transfer router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .route("/download/:file_name", get(download_file))
}

/// Upload outcome body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    fn with_error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: Some(error.into()),
        }
    }
}

type UploadRejection = (StatusCode, Json<MessageResponse>);

fn bad_request(message: impl Into<String>) -> UploadRejection {
    (StatusCode::BAD_REQUEST, Json(MessageResponse::new(message)))
}

/// Accept a `file` part and a `fileName` part, then publish the file as chunks
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<MessageResponse>, UploadRejection> {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        bad_request(format!("Failed to read upload: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let extension = original_extension(field.file_name().unwrap_or(""));
                let data = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read file data: {}", e);
                    bad_request(format!("Failed to read file data: {}", e))
                })?;
                file = Some((extension, data));
            }
            "fileName" => {
                let text = field.text().await.map_err(|e| {
                    bad_request(format!("Failed to read fileName: {}", e))
                })?;
                file_name = Some(text);
            }
            other => {
                tracing::debug!("Ignoring multipart field '{}'", other);
            }
        }
    }

    let Some((extension, data)) = file else {
        tracing::warn!("No file field found in multipart upload");
        return Err(bad_request("File is required"));
    };

    let file_name = match file_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(bad_request("fileName is required")),
    };

    let transfer = state.transfer();
    match transfer.upload(&file_name, &extension, &data).await {
        Ok(_) => Ok(Json(MessageResponse::new(
            "File upload request sent successfully.",
        ))),
        Err(TransferError::FileTooLarge { max, .. }) => Err(bad_request(format!(
            "File size cannot exceed {}MB",
            max / (1024 * 1024)
        ))),
        Err(TransferError::Validation(message)) => Err(bad_request(message)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(MessageResponse::with_error("Upload failed", e.to_string())),
        )),
    }
}

/// Stream a stored file as an attachment named after its original extension
async fn download_file(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response> {
    let download = state.transfer().prepare_download(&file_name).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&download.download_name),
        )
        .body(Body::from_stream(download.stream))
        .map_err(|e| TransferError::Assembly(format!("Failed to build response: {}", e)))
}

/// `attachment` disposition for `name`.
///
/// Plain printable ASCII names are quoted as-is. Anything else gets an
/// escaped ASCII fallback plus an RFC 5987 `filename*` parameter.
fn content_disposition(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| (c == ' ' || c.is_ascii_graphic()) && c != '"' && c != '\\');
    if plain {
        return format!("attachment; filename=\"{}\"", name);
    }

    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => format!("\\{}", c),
            c if c == ' ' || c.is_ascii_graphic() => c.to_string(),
            _ => "_".to_string(),
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

//! Document upload handler

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::AppState;
use cognexia_common::errors::{AppError, Result};

/// Every PDF starts with this header
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub chunks: usize,
    pub pages: usize,
    pub source: String,
}

/// Index an uploaded PDF (multipart field `file`)
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>> {
    let mut multipart = multipart.map_err(|e| AppError::Validation {
        message: e.body_text(),
        field: None,
    })?;

    let limit = state.config.server.max_upload_bytes;
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let read_error = |e: MultipartError| multipart_error(e, declared, limit);

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "upload.pdf".to_string());
        let bytes = field.bytes().await.map_err(read_error)?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::InvalidFormat {
            message: format!("{} is not a PDF document", filename),
        });
    }

    tracing::info!(source = %filename, size = bytes.len(), "Upload received");

    let report = state.pipeline.ingest(&bytes, &filename).await?;

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        chunks: report.chunks,
        pages: report.pages,
        source: report.source,
    }))
}

fn multipart_error(e: MultipartError, declared: Option<usize>, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            size: declared.unwrap_or(limit + 1),
            limit,
        }
    } else {
        AppError::Validation {
            message: e.body_text(),
            field: Some("file".to_string()),
        }
    }
}

/// Keep only the last path component of a client supplied name
fn sanitize_filename(name: &str) -> String {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}

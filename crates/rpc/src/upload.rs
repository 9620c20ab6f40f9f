//! Multipart decoding for `POST /api/upload`.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use sharelock_gateway::{FileUpload, GatewayError, RegistrationRequest};

use crate::errors::ApiError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "size_exceeded"
        } else {
            "validation_error"
        };
        ApiError::new(status, code, err.body_text())
    }
}

/// Read the upload form. The file part is read chunk by chunk and rejected
/// as soon as it grows past `max_bytes`.
pub async fn read_registration(
    mut multipart: Multipart,
    max_bytes: u64,
) -> Result<RegistrationRequest, ApiError> {
    let mut request = RegistrationRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if request.file.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                request.file = read_file(field, max_bytes).await?;
            }
            "url" => {
                request.url = Some(field.text().await?);
            }
            "isPrivate" => {
                request.is_private = field.text().await?.trim().eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    Ok(request)
}

async fn read_file(mut field: Field<'_>, max_bytes: u64) -> Result<Option<FileUpload>, ApiError> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.is_empty());
    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        let actual = (bytes.len() + chunk.len()) as u64;
        if actual > max_bytes {
            return Err(GatewayError::SizeExceeded {
                limit: max_bytes,
                actual,
            }
            .into());
        }
        bytes.extend_from_slice(&chunk);
    }

    // Browsers send an empty, unnamed part when no file was chosen
    if bytes.is_empty() && original_name.is_none() {
        return Ok(None);
    }

    Ok(Some(FileUpload {
        bytes,
        content_type,
        original_name,
    }))
}

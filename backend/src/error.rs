use actix_multipart::MultipartError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::imaging::ImageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Problems with the request itself. Backend failures never surface here;
/// they come back as an error record inside a normal result.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image file was uploaded")]
    MissingImage,
    #[error("The submitted file is not an image")]
    NotAnImage,
    #[error("Image exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid image payload: {0}")]
    InvalidPayload(#[from] ImageError),
    #[error("File {0} was not found")]
    FileNotFound(String),
    #[error("Analysis of server-side files is disabled")]
    FilePathDisabled,
    #[error("Upload failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Error processing the image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::NotAnImage
            | ApiError::BadRequest(_)
            | ApiError::InvalidPayload(_)
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::FilePathDisabled => StatusCode::FORBIDDEN,
            ApiError::Io(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("Rejected request: {}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

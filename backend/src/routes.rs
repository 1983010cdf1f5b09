use std::path::PathBuf;

use actix_multipart::{Field, Multipart};
use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use shared::Base64AnalysisRequest;

use crate::analysis::{AnalysisRequest, Analyzer};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::imaging;

const MAX_TEXT_FIELD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub max_image_bytes: usize,
    pub allow_file_path_analysis: bool,
}

impl From<&ServerConfig> for RequestLimits {
    fn from(server: &ServerConfig) -> Self {
        Self {
            max_image_bytes: server.max_image_bytes,
            allow_file_path_analysis: server.allow_file_path_analysis,
        }
    }
}

impl RequestLimits {
    fn check_size(&self, len: usize) -> Result<(), ApiError> {
        if len > self.max_image_bytes {
            return Err(ApiError::TooLarge(self.max_image_bytes));
        }
        Ok(())
    }

    /// Base64 inflates by 4/3; leave room for the data URL prefix and hints.
    fn json_limit(&self) -> usize {
        self.max_image_bytes / 3 * 4 + 64 * 1024
    }
}

enum FileLookup {
    Contents(Vec<u8>),
    Missing,
    TooLarge,
}

#[derive(Debug, Deserialize)]
struct FilePathQuery {
    file_path: String,
    category: Option<String>,
    description: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, limits: &RequestLimits) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/analyze").route(web::post().to(analyze_upload)))
        .service(
            web::resource("/analyze/file_path")
                .app_data(web::QueryConfig::default().error_handler(query_error))
                .route(web::post().to(analyze_file_path)),
        )
        .service(
            web::resource("/analyze/base64")
                .app_data(json_config(limits))
                .route(web::post().to(analyze_base64)),
        );
}

/// Extractor failures get the same `{"error": ...}` body as handler errors.
fn json_config(limits: &RequestLimits) -> web::JsonConfig {
    let max_image_bytes = limits.max_image_bytes;
    web::JsonConfig::default()
        .limit(limits.json_limit())
        .error_handler(move |err, _req| {
            let api_error = match err {
                JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                    ApiError::TooLarge(max_image_bytes)
                }
                other => ApiError::BadRequest(other.to_string()),
            };
            api_error.into()
        })
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Smart City AI Service API",
        "status": "active"
    }))
}

async fn health(analyzer: web::Data<Analyzer>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "backend": analyzer.kind().as_str()
    }))
}

async fn analyze_upload(
    analyzer: web::Data<Analyzer>,
    limits: web::Data<RequestLimits>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut image: Option<Vec<u8>> = None;
    let mut category = None;
    let mut description = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let is_image = field
                    .content_type()
                    .is_some_and(|mime| mime.type_().as_str() == "image");
                if !is_image {
                    return Err(ApiError::NotAnImage);
                }
                let mut data = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    limits.check_size(data.len() + chunk.len())?;
                    data.extend_from_slice(&chunk);
                }
                image = Some(data);
            }
            "category" => category = Some(read_text_field(&mut field).await?),
            "description" => description = Some(read_text_field(&mut field).await?),
            other => {
                log::debug!("Ignoring unexpected multipart field {:?}", other);
                while field.try_next().await?.is_some() {}
            }
        }
    }

    let image = image.filter(|data| !data.is_empty()).ok_or(ApiError::MissingImage)?;
    let result = analyzer
        .analyze(AnalysisRequest::new(image, category, description))
        .await;
    Ok(HttpResponse::Ok().json(result))
}

async fn read_text_field(field: &mut Field) -> Result<String, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        let room = MAX_TEXT_FIELD_BYTES.saturating_sub(data.len());
        data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Reads an image already on the server. Meant for local testing.
async fn analyze_file_path(
    analyzer: web::Data<Analyzer>,
    limits: web::Data<RequestLimits>,
    query: web::Query<FilePathQuery>,
) -> Result<HttpResponse, ApiError> {
    if !limits.allow_file_path_analysis {
        return Err(ApiError::FilePathDisabled);
    }
    let FilePathQuery {
        file_path,
        category,
        description,
    } = query.into_inner();

    let path = PathBuf::from(&file_path);
    let max_bytes = limits.max_image_bytes;
    let lookup = web::block(move || -> std::io::Result<FileLookup> {
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(FileLookup::Missing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileLookup::Missing),
            Err(e) => return Err(e),
        };
        if metadata.len() > max_bytes as u64 {
            return Ok(FileLookup::TooLarge);
        }
        Ok(FileLookup::Contents(std::fs::read(&path)?))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let image = match lookup {
        FileLookup::Contents(image) => image,
        FileLookup::Missing => return Err(ApiError::FileNotFound(file_path)),
        FileLookup::TooLarge => return Err(ApiError::TooLarge(max_bytes)),
    };
    let result = analyzer
        .analyze(AnalysisRequest::new(image, category, description))
        .await;
    Ok(HttpResponse::Ok().json(result))
}

async fn analyze_base64(
    analyzer: web::Data<Analyzer>,
    limits: web::Data<RequestLimits>,
    body: web::Json<Base64AnalysisRequest>,
) -> Result<HttpResponse, ApiError> {
    let Base64AnalysisRequest {
        image,
        category,
        description,
    } = body.into_inner();

    let image = imaging::decode_base64_payload(&image)?;
    if image.is_empty() {
        return Err(ApiError::MissingImage);
    }
    limits.check_size(image.len())?;
    if imaging::sniff_format(&image).is_none() {
        return Err(ApiError::NotAnImage);
    }

    let result = analyzer
        .analyze(AnalysisRequest::new(image, category, description))
        .await;
    Ok(HttpResponse::Ok().json(result))
}

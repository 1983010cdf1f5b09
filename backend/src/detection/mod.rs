pub mod config;
#[cfg(feature = "torch")]
pub mod torch;
pub mod verdict;
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub mod yolo;

use std::sync::Arc;

use actix_web::web;
use image::DynamicImage;
use shared::Finding;

use crate::analysis::AnalysisRequest;
use crate::imaging::{self, ImageError};
use config::DetectionConfig;

pub const DETECTOR_ERROR: &str = "Error running the local detector";

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Unexpected model output: {0}")]
    Shape(String),
    #[cfg(feature = "torch")]
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("Model lock poisoned")]
    Poisoned,
    #[error("Detector task failed: {0}")]
    Blocking(String),
}

/// Axis-aligned box in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
        .area();
        let union = self.area() + other.area() - intersection;
        if union > 0.0 { intersection / union } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A loaded object detector. Implementations are called from the blocking
/// thread pool.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, DetectionError>;
}

#[derive(Clone)]
pub struct LocalBackend {
    detector: Arc<dyn Detector>,
    config: Arc<DetectionConfig>,
}

impl LocalBackend {
    pub fn new(detector: Arc<dyn Detector>, config: Arc<DetectionConfig>) -> Self {
        Self { detector, config }
    }

    #[cfg(feature = "torch")]
    pub fn load(config: DetectionConfig) -> Result<Self, DetectionError> {
        let config = Arc::new(config);
        let detector = torch::TorchDetector::load(&config.model.path, config.clone())?;
        Ok(Self::new(Arc::new(detector), config))
    }

    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Finding {
        let detector = self.detector.clone();
        let config = self.config.clone();
        let image = request.image.clone();

        let outcome = web::block(move || -> Result<Vec<Detection>, DetectionError> {
            let mut decoded = imaging::decode(&image)?;
            if config.preprocessing.enhance {
                decoded = imaging::enhance(&decoded, config.preprocessing.enhancement_factor);
            }
            detector.detect(&decoded)
        })
        .await
        .map_err(|e| DetectionError::Blocking(e.to_string()))
        .and_then(|result| result);

        match outcome {
            Ok(detections) => {
                log::info!("[{}] Detector returned {} boxes", request.id, detections.len());
                verdict::summarize(&detections, &self.config, request.hint_department())
            }
            Err(e) => {
                log::error!("[{}] Local detection failed: {}", request.id, e);
                Finding::failure(format!("Error: {}", e), DETECTOR_ERROR)
            }
        }
    }
}

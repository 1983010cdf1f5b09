use chrono::Utc;
use shared::{AnalysisResult, Department};
use uuid::Uuid;

use crate::config::{AppConfig, BackendKind, ConfigError};
use crate::detection::config::DetectionConfig;
use crate::detection::{DetectionError, LocalBackend};
use crate::vision::{VisionClient, VisionError};

/// One image to analyze plus whatever the reporter told us about it.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: Uuid,
    pub image: Vec<u8>,
    pub category_hint: Option<String>,
    pub description: Option<String>,
}

impl AnalysisRequest {
    pub fn new(image: Vec<u8>, category_hint: Option<String>, description: Option<String>) -> Self {
        let clean = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            id: Uuid::new_v4(),
            image,
            category_hint: clean(category_hint),
            description: clean(description),
        }
    }

    pub fn hint_department(&self) -> Option<Department> {
        self.category_hint
            .as_deref()
            .and_then(Department::from_label)
            .filter(|d| !d.is_sentinel())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to build vision client: {0}")]
    Vision(#[from] VisionError),
    #[error("Failed to load detector: {0}")]
    Detector(#[from] DetectionError),
}

/// The detection backend selected at startup.
#[derive(Clone)]
pub enum Analyzer {
    Remote(VisionClient),
    Local(LocalBackend),
}

impl Analyzer {
    pub fn from_config(config: &AppConfig) -> Result<Self, AnalyzerInitError> {
        match config.backend {
            BackendKind::Remote => {
                let client = VisionClient::new(&config.vision)?;
                log::info!("Using remote vision backend at {}", client.completions_url());
                Ok(Analyzer::Remote(client))
            }
            BackendKind::Local => {
                let mut detection = DetectionConfig::load(&config.detection_config_path)?;
                if let Some(path) = &config.model_path {
                    detection.model.path = path.clone();
                }
                Self::local(detection)
            }
        }
    }

    #[cfg(feature = "torch")]
    fn local(detection: DetectionConfig) -> Result<Self, AnalyzerInitError> {
        let backend = LocalBackend::load(detection)?;
        log::info!(
            "Using local detection backend ({} classes)",
            backend.config().classes.len()
        );
        Ok(Analyzer::Local(backend))
    }

    #[cfg(not(feature = "torch"))]
    fn local(_detection: DetectionConfig) -> Result<Self, AnalyzerInitError> {
        Err(ConfigError::TorchUnavailable.into())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Analyzer::Remote(_) => BackendKind::Remote,
            Analyzer::Local(_) => BackendKind::Local,
        }
    }

    /// Runs the backend and stamps the result. Backend failures come back
    /// as the canonical error record, never as an `Err`.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        log::info!(
            "[{}] Analyzing {} byte image with {} backend",
            request.id,
            request.image.len(),
            self.kind().as_str()
        );
        let finding = match self {
            Analyzer::Remote(client) => client.analyze(&request).await,
            Analyzer::Local(backend) => backend.analyze(&request).await,
        };
        if finding.is_failure() {
            log::warn!("[{}] Analysis degraded to error record", request.id);
        } else {
            log::info!(
                "[{}] Routed to {} with severity {}",
                request.id,
                finding.department,
                finding.severity
            );
        }
        finding.into_result(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trims_hints() {
        let request = AnalysisRequest::new(Vec::new(), Some("  Iluminat public ".into()), Some("   ".into()));
        assert_eq!(request.category_hint.as_deref(), Some("Iluminat public"));
        assert_eq!(request.description, None);
        assert_eq!(request.hint_department(), Some(Department::PublicLighting));
    }

    #[test]
    fn sentinel_hints_are_ignored() {
        let request = AnalysisRequest::new(Vec::new(), Some("ok".into()), None);
        assert_eq!(request.hint_department(), None);
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn local_backend_requires_torch_feature() {
        let config = AppConfig::from_lookup(|key| match key {
            "AI_BACKEND" => Some("local".to_string()),
            "DETECTION_CONFIG" => Some("/nonexistent/detection.yaml".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(matches!(
            Analyzer::from_config(&config),
            Err(AnalyzerInitError::Config(ConfigError::TorchUnavailable))
        ));
    }

    #[test]
    fn remote_backend_from_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let analyzer = Analyzer::from_config(&config).unwrap();
        assert_eq!(analyzer.kind(), BackendKind::Remote);
    }
}

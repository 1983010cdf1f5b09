use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Failed to read detection config {path}: {source}")]
    DetectionConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse detection config {path}: {source}")]
    DetectionConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Local detection requires the `torch` feature")]
    TorchUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "azure" | "vision" => Ok(BackendKind::Remote),
            "local" | "yolo" => Ok(BackendKind::Local),
            other => Err(format!("expected `remote` or `local`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub endpoint: Url,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_dimension: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub max_image_bytes: usize,
    pub allow_file_path_analysis: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub detection_config_path: PathBuf,
    pub model_path: Option<PathBuf>,
}

pub const DEFAULT_ENDPOINT: &str = "https://models.inference.ai.azure.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

impl AppConfig {
    /// Reads the process environment. Call `dotenv` first if a `.env` file
    /// should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = parse_or(&get, "AI_BACKEND", BackendKind::Remote)?;

        let endpoint = get("AZURE_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let vision = VisionConfig {
            api_key: get("AZURE_API_KEY").unwrap_or_default(),
            endpoint: Url::parse(endpoint.trim())?,
            model: get("AZURE_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_or(&get, "VISION_TEMPERATURE", 0.7)?,
            top_p: parse_or(&get, "VISION_TOP_P", 0.95)?,
            max_tokens: parse_or(&get, "VISION_MAX_TOKENS", 300)?,
            timeout: Duration::from_secs(parse_or(&get, "VISION_TIMEOUT_SECS", 30)?),
            max_dimension: parse_or(&get, "VISION_MAX_DIMENSION", 2048)?,
        };

        let allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8000)?,
            allowed_origins,
            max_image_bytes: parse_or(&get, "MAX_IMAGE_BYTES", 20 * 1024 * 1024)?,
            allow_file_path_analysis: parse_bool_or(&get, "ALLOW_FILE_PATH_ANALYSIS", true)?,
        };

        Ok(Self {
            backend,
            server,
            vision,
            detection_config_path: get("DETECTION_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/detection.yaml")),
            model_path: get("YOLO_MODEL_PATH").map(PathBuf::from),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        },
        None => Ok(default),
    }
}

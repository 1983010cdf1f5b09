use serde::{Deserialize, Serialize};
use shared::{Department, Severity};
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub version: f32,
    pub model: ModelConfig,
    pub preprocessing: PreprocessingConfig,
    pub classes: Vec<ClassMapping>,
    pub severity: SeverityRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub enhance: bool,
    pub enhancement_factor: f32,
}

/// Class index `i` of the detector is `classes[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMapping {
    pub name: String,
    pub department: Department,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityRules {
    /// Checked in order; the first tier whose `above` is exceeded wins.
    pub fix_times: Vec<FixTimeTier>,
    pub default_estimate: String,
    pub no_detection_estimate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixTimeTier {
    pub above: u8,
    pub estimate: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            version: 1.0,
            model: ModelConfig {
                path: PathBuf::from("models/urban_problems.torchscript"),
                input_size: 640,
                confidence_threshold: 0.25,
                nms_threshold: 0.45,
            },
            preprocessing: PreprocessingConfig {
                enhance: true,
                enhancement_factor: 1.5,
            },
            classes: vec![
                ClassMapping {
                    name: "pothole".into(),
                    department: Department::PublicRoads,
                },
                ClassMapping {
                    name: "garbage".into(),
                    department: Department::Sanitation,
                },
                ClassMapping {
                    name: "graffiti".into(),
                    department: Department::Police,
                },
            ],
            severity: SeverityRules {
                fix_times: vec![
                    FixTimeTier {
                        above: 8,
                        estimate: "3-5 days".into(),
                    },
                    FixTimeTier {
                        above: 5,
                        estimate: "1-2 weeks".into(),
                    },
                ],
                default_estimate: "2-4 weeks".into(),
                no_detection_estimate: "unknown".into(),
            },
        }
    }
}

impl DetectionConfig {
    /// Loads the YAML file at `path`, or the built-in defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "Detection config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str =
            std::fs::read_to_string(path).map_err(|source| ConfigError::DetectionConfigIo {
                path: path.to_path_buf(),
                source,
            })?;
        let config: DetectionConfig =
            serde_yaml::from_str(&config_str).map_err(|source| ConfigError::DetectionConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        log::info!(
            "Loaded detection config {} ({} classes)",
            path.display(),
            config.classes.len()
        );
        Ok(config)
    }

    /// Rejects values the detector cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String, reason: &str| ConfigError::InvalidValue {
            key,
            value,
            reason: reason.to_string(),
        };
        let unit = |value: f32| (0.0..=1.0).contains(&value);

        if self.model.input_size == 0 {
            return Err(invalid(
                "model.input_size",
                self.model.input_size.to_string(),
                "must be positive",
            ));
        }
        if !unit(self.model.confidence_threshold) {
            return Err(invalid(
                "model.confidence_threshold",
                self.model.confidence_threshold.to_string(),
                "must be within [0, 1]",
            ));
        }
        if !unit(self.model.nms_threshold) {
            return Err(invalid(
                "model.nms_threshold",
                self.model.nms_threshold.to_string(),
                "must be within [0, 1]",
            ));
        }
        let factor = self.preprocessing.enhancement_factor;
        if !(factor.is_finite() && factor > 0.0) {
            return Err(invalid(
                "preprocessing.enhancement_factor",
                factor.to_string(),
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn class_label(&self, class_id: usize) -> String {
        self.classes
            .get(class_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn department_for(&self, class_id: usize) -> Option<Department> {
        self.classes.get(class_id).map(|c| c.department)
    }
}

impl SeverityRules {
    pub fn estimate(&self, severity: Severity) -> &str {
        self.fix_times
            .iter()
            .find(|tier| severity.value() > tier.above)
            .map(|tier| tier.estimate.as_str())
            .unwrap_or(self.default_estimate.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers() {
        let rules = DetectionConfig::default().severity;
        assert_eq!(rules.estimate(Severity::new(10)), "3-5 days");
        assert_eq!(rules.estimate(Severity::new(9)), "3-5 days");
        assert_eq!(rules.estimate(Severity::new(8)), "1-2 weeks");
        assert_eq!(rules.estimate(Severity::new(6)), "1-2 weeks");
        assert_eq!(rules.estimate(Severity::new(5)), "2-4 weeks");
        assert_eq!(rules.estimate(Severity::NONE), "2-4 weeks");
    }

    #[test]
    fn class_lookup() {
        let config = DetectionConfig::default();
        assert_eq!(config.class_label(1), "garbage");
        assert_eq!(config.department_for(2), Some(Department::Police));
        assert_eq!(config.class_label(7), "class_7");
        assert_eq!(config.department_for(7), None);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DetectionConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.classes.len(), 3);
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detection.yaml");
        std::fs::write(
            &path,
            r#"
version: 1.1
model:
  path: /models/city.torchscript
  input_size: 320
  confidence_threshold: 0.4
  nms_threshold: 0.5
preprocessing:
  enhance: false
  enhancement_factor: 1.0
classes:
  - name: broken_lamp
    department: iluminat_public
  - name: fallen_tree
    department: spatii_verzi
severity:
  fix_times:
    - above: 7
      estimate: "24 hours"
  default_estimate: "1 week"
  no_detection_estimate: "n/a"
"#,
        )
        .unwrap();
        let config = DetectionConfig::load(&path).unwrap();
        assert_eq!(config.model.input_size, 320);
        assert_eq!(config.department_for(0), Some(Department::PublicLighting));
        assert_eq!(config.class_label(1), "fallen_tree");
        assert_eq!(config.severity.estimate(Severity::new(8)), "24 hours");
        assert_eq!(config.severity.estimate(Severity::new(7)), "1 week");
    }

    fn write_with_model(dir: &tempfile::TempDir, model: &str, factor: &str) -> PathBuf {
        let path = dir.path().join("detection.yaml");
        let mut config = serde_yaml::to_value(DetectionConfig::default()).unwrap();
        let overrides: serde_yaml::Value = serde_yaml::from_str(model).unwrap();
        for (key, value) in overrides.as_mapping().unwrap() {
            config["model"][key.as_str().unwrap()] = value.clone();
        }
        config["preprocessing"]["enhancement_factor"] = serde_yaml::from_str(factor).unwrap();
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();
        path
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("input_size: 0", "1.5", "model.input_size"),
            ("confidence_threshold: 1.5", "1.5", "model.confidence_threshold"),
            ("nms_threshold: -0.1", "1.5", "model.nms_threshold"),
            ("input_size: 320", "0.0", "preprocessing.enhancement_factor"),
        ];
        for (model, factor, expected) in cases {
            let path = write_with_model(&dir, model, factor);
            match DetectionConfig::load(&path) {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, expected),
                other => panic!("{} accepted: {:?}", expected, other.map(|c| c.model)),
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detection.yaml");
        std::fs::write(&path, "classes: [unterminated").unwrap();
        assert!(matches!(
            DetectionConfig::load(&path),
            Err(ConfigError::DetectionConfigParse { .. })
        ));
    }
}

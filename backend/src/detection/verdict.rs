use std::collections::BTreeMap;

use shared::{Department, Finding, Severity};

use super::Detection;
use super::config::DetectionConfig;

/// Reduces the detector's boxes to a single finding: the most confident
/// box decides the department, its confidence the severity.
pub fn summarize(
    detections: &[Detection],
    config: &DetectionConfig,
    hint: Option<Department>,
) -> Finding {
    let Some(best) = detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    else {
        let mut finding = Finding::new(
            Department::Ok,
            Severity::NONE,
            config.severity.no_detection_estimate.clone(),
        );
        finding.confidence = Some(0.0);
        return finding;
    };

    let department = config
        .department_for(best.class_id)
        .filter(|d| !d.is_sentinel())
        .or_else(|| hint.filter(|d| !d.is_sentinel()))
        .unwrap_or(Department::CityHall);
    let severity = Severity::from_confidence(best.confidence);

    let mut detected_objects: BTreeMap<String, f32> = BTreeMap::new();
    for detection in detections {
        detected_objects
            .entry(detection.label.clone())
            .and_modify(|c| *c = c.max(detection.confidence))
            .or_insert(detection.confidence);
    }

    let mut finding = Finding::new(department, severity, config.severity.estimate(severity))
        .with_description(Some(format!(
            "Detected {} ({:.0}% confidence)",
            best.label.replace('_', " "),
            best.confidence * 100.0
        )));
    finding.confidence = Some(best.confidence);
    finding.detected_objects = detected_objects;
    finding
}

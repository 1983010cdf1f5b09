use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use shared::{Department, Finding, Severity};

pub const UNREADABLE_DESCRIPTION: &str = "Could not analyze the image";
pub const UNREADABLE_ERROR: &str = "Error processing the AI response";

lazy_static! {
    // Greedy on purpose: spans from the first `{` to the last `}`.
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("static regex");
    static ref LEADING_NUMBER: Regex = Regex::new(r"-?\d+(?:[.,]\d+)?").expect("static regex");
}

const CATEGORY_KEYS: [&str; 4] = ["detected_category", "detectedCategory", "department", "category"];
const SEVERITY_KEYS: [&str; 3] = ["severity_score", "severityScore", "severity"];
const FIX_TIME_KEYS: [&str; 3] = ["estimated_fix_time", "estimatedFixTime", "fix_time"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "descriere", "problem"];

/// Parses the model's text, salvaging an embedded JSON object when the
/// reply carries prose or code fences around it.
pub fn parse_reply(reply: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(reply.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Model reply is not valid JSON ({}), attempting salvage", e);
            let candidate = JSON_OBJECT.find(reply)?;
            match serde_json::from_str::<Value>(candidate.as_str()) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::error!("Salvaged fragment is still not JSON: {}; reply: {}", e, reply);
                    None
                }
            }
        }
    }
}

/// Turns a raw model reply into a normalized finding. Never fails: anything
/// that cannot be understood becomes the canonical error record.
pub fn interpret_reply(reply: &str, hint: Option<Department>) -> Finding {
    let unreadable = || Finding::failure(UNREADABLE_DESCRIPTION, UNREADABLE_ERROR);

    let Some(value) = parse_reply(reply) else {
        return unreadable();
    };
    let Some(object) = value.as_object() else {
        log::error!("Model reply is JSON but not an object: {}", value);
        return unreadable();
    };
    match normalize(object, hint) {
        Some(finding) => finding,
        None => {
            log::error!("Model reply has no usable detected_category: {}", value);
            unreadable()
        }
    }
}

fn normalize(object: &Map<String, Value>, hint: Option<Department>) -> Option<Finding> {
    let department = read_department(field(object, &CATEGORY_KEYS)?, hint)?;
    let description = field(object, &DESCRIPTION_KEYS)
        .and_then(Value::as_str)
        .map(|d| d.trim().to_string());

    let finding = match department {
        Department::Error => Finding::failure(
            description.unwrap_or_else(|| UNREADABLE_DESCRIPTION.to_string()),
            UNREADABLE_ERROR,
        ),
        Department::Ok => Finding::new(Department::Ok, Severity::NONE, "0").with_description(description),
        department => {
            let severity = field(object, &SEVERITY_KEYS)
                .and_then(read_score)
                .map(Severity::from_score)
                .unwrap_or(Severity::MIN);
            let fix_time = field(object, &FIX_TIME_KEYS)
                .and_then(read_text)
                .unwrap_or_else(|| "unknown".to_string());
            Finding::new(department, severity, fix_time).with_description(description)
        }
    };
    Some(finding)
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// Accepts a label or a list of labels. A label the service does not know
/// is routed to the reporter's hint, then to city hall.
fn read_department(value: &Value, hint: Option<Department>) -> Option<Department> {
    let labels: Vec<&str> = match value {
        Value::String(label) => vec![label.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let labels: Vec<&str> = labels
        .into_iter()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect();
    if labels.is_empty() {
        return None;
    }

    if let Some(department) = labels.iter().find_map(|label| Department::from_label(label)) {
        return Some(department);
    }
    let fallback = hint
        .filter(|d| !d.is_sentinel())
        .unwrap_or(Department::CityHall);
    log::warn!(
        "Unrecognized department label(s) {:?}, routing to {}",
        labels,
        fallback
    );
    Some(fallback)
}

fn read_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => LEADING_NUMBER
            .find(text)
            .and_then(|m| m.as_str().replace(',', ".").parse().ok()),
        _ => None,
    }
}

fn read_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

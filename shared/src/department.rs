use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Municipal department responsible for a reported problem.
///
/// The wire labels are the ones the municipal backend stores; English
/// aliases are accepted when parsing model output.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Department {
    #[serde(rename = "salubrizare")]
    #[strum(to_string = "salubrizare", serialize = "sanitation", serialize = "waste")]
    Sanitation,
    #[serde(rename = "politie")]
    #[strum(to_string = "politie", serialize = "police")]
    Police,
    #[serde(rename = "primarie")]
    #[strum(
        to_string = "primarie",
        serialize = "city_hall",
        serialize = "municipality",
        serialize = "general"
    )]
    CityHall,
    #[serde(rename = "iluminat_public")]
    #[strum(
        to_string = "iluminat_public",
        serialize = "lighting",
        serialize = "public_lighting"
    )]
    PublicLighting,
    #[serde(rename = "spatii_verzi")]
    #[strum(
        to_string = "spatii_verzi",
        serialize = "green_spaces",
        serialize = "parks"
    )]
    GreenSpaces,
    #[serde(rename = "drumuri_publice")]
    #[strum(
        to_string = "drumuri_publice",
        serialize = "roads",
        serialize = "public_roads"
    )]
    PublicRoads,
    /// Nothing that needs a department was found.
    #[serde(rename = "ok")]
    #[strum(to_string = "ok", serialize = "none", serialize = "no_problem")]
    Ok,
    /// The analysis itself failed.
    #[serde(rename = "error")]
    #[strum(to_string = "error")]
    Error,
}

impl Department {
    pub fn label(self) -> &'static str {
        self.into()
    }

    pub fn is_sentinel(self) -> bool {
        matches!(self, Department::Ok | Department::Error)
    }

    /// Departments a problem can actually be routed to.
    pub fn routable() -> impl Iterator<Item = Department> {
        Department::iter().filter(|d| !d.is_sentinel())
    }

    /// Lenient parse of a free-text label: trims punctuation, folds
    /// Romanian diacritics and treats spaces and hyphens as underscores.
    pub fn from_label(raw: &str) -> Option<Department> {
        let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || "\"'.,;:[]".contains(c));
        if trimmed.is_empty() {
            return None;
        }
        let normalized: String = trimmed
            .chars()
            .map(|c| match c {
                'ă' | 'â' | 'Ă' | 'Â' => 'a',
                'î' | 'Î' => 'i',
                'ș' | 'ş' | 'Ș' | 'Ş' => 's',
                'ț' | 'ţ' | 'Ț' | 'Ţ' => 't',
                ' ' | '-' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        Department::from_str(&normalized).ok()
    }
}

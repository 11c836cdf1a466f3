//! Display-ready shapes of analyses: badges, nutrient rows, allergen warnings and history cards.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    AllergenDetection, AnalysisStatus, AnalysisWithAllergens, NutrientMap, NutritionalAnalysis,
};
use crate::allergens::Severity;

pub const NO_ALLERGENS_MESSAGE: &str = "No common allergens detected";
pub const UNKNOWN_FOOD: &str = "Unknown Food";
const ERROR_PREVIEW_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: String,
    pub tone: Tone,
}

impl From<AnalysisStatus> for StatusBadge {
    fn from(status: AnalysisStatus) -> Self {
        let tone = match status {
            AnalysisStatus::Completed => Tone::Success,
            AnalysisStatus::Processing => Tone::Info,
            AnalysisStatus::Failed => Tone::Error,
            AnalysisStatus::Pending => Tone::Warning,
        };
        Self {
            label: title_case(status.as_str()),
            tone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceDisplay {
    pub percent: f64,
    pub text: String,
    pub level: ConfidenceLevel,
}

impl ConfidenceDisplay {
    pub fn new(score: f64) -> Self {
        let percent = (score * 1000.0).round() / 10.0;
        let level = if percent >= 80.0 {
            ConfidenceLevel::High
        } else if percent >= 60.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };
        Self {
            percent,
            text: format!("{percent:.1}%"),
            level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientRow {
    pub name: String,
    pub value: f64,
    pub unit: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortionCard {
    pub portion_g: f64,
    pub total_calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergenWarning {
    pub name: String,
    pub severity: Severity,
    pub icon: Tone,
    pub detected_in: Option<String>,
    pub confidence: ConfidenceDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergenPanel {
    pub warnings: Vec<AllergenWarning>,
    /// Set only when there is nothing to warn about.
    pub message: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisView {
    pub analysis_id: Uuid,
    pub food_image_id: Uuid,
    pub status: StatusBadge,
    pub food_items: Vec<String>,
    pub food_summary: String,
    pub confidence: Option<ConfidenceDisplay>,
    pub calories_per_100g: Option<f64>,
    pub macronutrients: Vec<NutrientRow>,
    pub portion: Option<PortionCard>,
    pub vitamins: Vec<NutrientRow>,
    pub minerals: Vec<NutrientRow>,
    pub allergens: AllergenPanel,
    pub ai_model_used: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryCard {
    pub analysis_id: Uuid,
    pub food_image_id: Uuid,
    pub food_summary: String,
    pub status: StatusBadge,
    pub confidence: Option<ConfidenceDisplay>,
    pub processing_seconds: Option<f64>,
    pub highlights: Vec<String>,
    pub error_preview: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `vitamin_c_mg` -> `Vitamin C Mg`.
pub fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn food_summary(items: &[String]) -> String {
    if items.is_empty() {
        UNKNOWN_FOOD.to_string()
    } else {
        items.join(", ")
    }
}

pub fn macronutrient_rows(a: &NutritionalAnalysis) -> Vec<NutrientRow> {
    [
        ("Protein", a.protein_g, "g"),
        ("Carbohydrates", a.carbohydrates_g, "g"),
        ("Total Fat", a.total_fat_g, "g"),
        ("Saturated Fat", a.saturated_fat_g, "g"),
        ("Fiber", a.fiber_g, "g"),
        ("Sugar", a.sugar_g, "g"),
        ("Sodium", a.sodium_mg, "mg"),
    ]
    .into_iter()
    .filter_map(|(name, value, unit)| {
        Some(NutrientRow {
            name: name.to_string(),
            value: value?,
            unit,
        })
    })
    .collect()
}

fn vitamin_unit(key: &str) -> &'static str {
    let key = key.to_lowercase();
    if key.contains("mcg") || key.contains("folate") {
        "mcg"
    } else if key.contains("iu") {
        "IU"
    } else {
        "mg"
    }
}

fn micronutrient_rows(map: &NutrientMap, unit_for: impl Fn(&str) -> &'static str) -> Vec<NutrientRow> {
    map.iter()
        .filter_map(|(key, value)| {
            Some(NutrientRow {
                name: title_case(key),
                value: value.as_f64()?,
                unit: unit_for(key),
            })
        })
        .collect()
}

pub fn vitamin_rows(map: &NutrientMap) -> Vec<NutrientRow> {
    micronutrient_rows(map, vitamin_unit)
}

pub fn mineral_rows(map: &NutrientMap) -> Vec<NutrientRow> {
    micronutrient_rows(map, |_| "mg")
}

pub fn severity_icon(severity: Severity) -> Tone {
    match severity {
        Severity::Mild => Tone::Info,
        Severity::Moderate => Tone::Warning,
        Severity::Severe => Tone::Error,
    }
}

impl From<&[AllergenDetection]> for AllergenPanel {
    fn from(detections: &[AllergenDetection]) -> Self {
        let warnings: Vec<AllergenWarning> = detections
            .iter()
            .map(|d| AllergenWarning {
                name: title_case(&d.allergen.name),
                severity: d.allergen.severity,
                icon: severity_icon(d.allergen.severity),
                detected_in: d.detected_in.clone(),
                confidence: ConfidenceDisplay::new(d.confidence_score),
            })
            .collect();
        let message = warnings.is_empty().then_some(NO_ALLERGENS_MESSAGE);
        Self { warnings, message }
    }
}

fn error_preview(message: &str) -> String {
    match message.char_indices().nth(ERROR_PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

fn highlights(a: &NutritionalAnalysis) -> Vec<String> {
    let mut chips = Vec::new();
    if let Some(cal) = a.calories {
        chips.push(format!("{cal:.0} cal"));
    }
    if let Some(protein) = a.protein_g {
        chips.push(format!("{protein:.1}g protein"));
    }
    if let Some(fat) = a.total_fat_g {
        chips.push(format!("{fat:.1}g fat"));
    }
    chips
}

impl From<&AnalysisWithAllergens> for AnalysisView {
    fn from(full: &AnalysisWithAllergens) -> Self {
        let a = &full.analysis;
        let portion = match (a.estimated_portion_g, a.total_calories) {
            (Some(portion_g), Some(total_calories)) => Some(PortionCard {
                portion_g,
                total_calories,
            }),
            _ => None,
        };
        Self {
            analysis_id: a.id,
            food_image_id: a.food_image_id,
            status: a.status.into(),
            food_items: a.food_items.clone(),
            food_summary: food_summary(&a.food_items),
            confidence: a.confidence_score.map(ConfidenceDisplay::new),
            calories_per_100g: a.calories,
            macronutrients: macronutrient_rows(a),
            portion,
            vitamins: vitamin_rows(&a.vitamins),
            minerals: mineral_rows(&a.minerals),
            allergens: full.allergens.as_slice().into(),
            ai_model_used: a.ai_model_used.clone(),
            processing_time_ms: a.processing_time_ms,
            error_message: a.error_message.clone(),
            created_at: a.created_at,
        }
    }
}

impl From<&NutritionalAnalysis> for HistoryCard {
    fn from(a: &NutritionalAnalysis) -> Self {
        let completed = a.status == AnalysisStatus::Completed;
        let failed = a.status == AnalysisStatus::Failed;
        Self {
            analysis_id: a.id,
            food_image_id: a.food_image_id,
            food_summary: food_summary(&a.food_items),
            status: a.status.into(),
            confidence: a.confidence_score.map(ConfidenceDisplay::new),
            processing_seconds: a.processing_time_ms.map(|ms| ms as f64 / 1000.0),
            highlights: if completed { highlights(a) } else { Vec::new() },
            error_preview: a
                .error_message
                .as_deref()
                .filter(|_| failed)
                .map(error_preview),
            created_at: a.created_at,
        }
    }
}

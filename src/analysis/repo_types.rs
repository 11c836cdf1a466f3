use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::allergens::{Allergen, Severity};

pub type NutrientMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => anyhow::bail!("unknown analysis status {other:?}"),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct NutritionalAnalysisRow {
    pub id: Uuid,
    pub food_image_id: Uuid,
    pub status: String,
    pub food_items: Vec<String>,
    pub confidence_score: Option<f64>,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub total_fat_g: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub estimated_portion_g: Option<f64>,
    pub total_calories: Option<f64>,
    pub vitamins: Json<NutrientMap>,
    pub minerals: Json<NutrientMap>,
    pub ai_model_used: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Classification result for one image. Nutrient figures are per 100g.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionalAnalysis {
    pub id: Uuid,
    pub food_image_id: Uuid,
    pub status: AnalysisStatus,
    pub food_items: Vec<String>,
    pub confidence_score: Option<f64>,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub total_fat_g: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub estimated_portion_g: Option<f64>,
    pub total_calories: Option<f64>,
    pub vitamins: NutrientMap,
    pub minerals: NutrientMap,
    pub ai_model_used: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<NutritionalAnalysisRow> for NutritionalAnalysis {
    fn from(r: NutritionalAnalysisRow) -> Self {
        Self {
            id: r.id,
            food_image_id: r.food_image_id,
            status: r.status.parse().unwrap_or_default(),
            food_items: r.food_items,
            confidence_score: r.confidence_score,
            calories: r.calories,
            protein_g: r.protein_g,
            carbohydrates_g: r.carbohydrates_g,
            total_fat_g: r.total_fat_g,
            saturated_fat_g: r.saturated_fat_g,
            fiber_g: r.fiber_g,
            sugar_g: r.sugar_g,
            sodium_mg: r.sodium_mg,
            estimated_portion_g: r.estimated_portion_g,
            total_calories: r.total_calories,
            vitamins: r.vitamins.0,
            minerals: r.minerals.0,
            ai_model_used: r.ai_model_used,
            processing_time_ms: r.processing_time_ms,
            error_message: r.error_message,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Detection joined with its allergen category.
#[derive(Debug, FromRow)]
pub struct AllergenDetectionRow {
    pub id: Uuid,
    pub nutritional_analysis_id: Uuid,
    pub confidence_score: f64,
    pub detected_in: Option<String>,
    pub created_at: OffsetDateTime,
    pub allergen_id: Uuid,
    pub allergen_name: String,
    pub allergen_description: Option<String>,
    pub allergen_severity: String,
    pub allergen_is_active: bool,
    pub allergen_created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergenDetection {
    pub id: Uuid,
    pub nutritional_analysis_id: Uuid,
    pub allergen: Allergen,
    pub confidence_score: f64,
    pub detected_in: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<AllergenDetectionRow> for AllergenDetection {
    fn from(r: AllergenDetectionRow) -> Self {
        Self {
            id: r.id,
            nutritional_analysis_id: r.nutritional_analysis_id,
            allergen: Allergen {
                id: r.allergen_id,
                name: r.allergen_name,
                description: r.allergen_description,
                severity: r.allergen_severity.parse::<Severity>().unwrap_or_default(),
                is_active: r.allergen_is_active,
                created_at: r.allergen_created_at,
            },
            confidence_score: r.confidence_score,
            detected_in: r.detected_in,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisWithAllergens {
    pub analysis: NutritionalAnalysis,
    pub allergens: Vec<AllergenDetection>,
}

/// One allergen as it will be persisted: name case-folded, confidence clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct AllergenFinding {
    pub name: String,
    pub confidence: f64,
    pub detected_in: Option<String>,
}

/// Terminal "completed" state written back onto an analysis row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisResults {
    pub food_items: Vec<String>,
    pub confidence_score: f64,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub total_fat_g: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub estimated_portion_g: Option<f64>,
    pub total_calories: Option<f64>,
    pub vitamins: NutrientMap,
    pub minerals: NutrientMap,
    pub allergens: Vec<AllergenFinding>,
}

use std::{collections::HashSet, time::Instant};

use anyhow::Context;
use base64ct::{Base64, Encoding};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::classifier::{ClassifierResponse, ReportedAllergen};
use super::repo;
use super::repo_types::{AllergenFinding, AnalysisResults, AnalysisWithAllergens, NutritionalAnalysis};
use crate::images::{self, repo_types::FoodImage};
use crate::state::AppState;

pub const MAX_ERROR_LEN: usize = 1000;
pub const MAX_DETECTED_IN_LEN: usize = 200;
pub const MAX_ALLERGEN_NAME_LEN: usize = 100;
pub const NO_RESULT_MESSAGE: &str = "Failed to analyze image with AI";

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Calories for the whole portion; needs both the per-100g figure and the portion weight.
pub fn total_calories(calories_per_100g: Option<f64>, portion_g: Option<f64>) -> Option<f64> {
    Some(calories_per_100g? * portion_g? / 100.0).filter(|t| t.is_finite())
}

pub(crate) fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Nutrient amounts can't be negative; nonsense values are treated as unknown.
fn non_negative(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x >= 0.0)
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub(crate) fn normalize_allergen_name(raw: &str) -> Option<String> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(truncate_chars(&name, MAX_ALLERGEN_NAME_LEN))
}

/// Case-folds names, drops blanks, keeps the first report of each allergen.
fn collect_allergens(reported: Vec<ReportedAllergen>) -> Vec<AllergenFinding> {
    let mut seen = HashSet::new();
    reported
        .into_iter()
        .filter_map(|a| {
            let name = normalize_allergen_name(&a.name)?;
            if !seen.insert(name.clone()) {
                return None;
            }
            Some(AllergenFinding {
                name,
                confidence: clamp_unit(a.confidence),
                detected_in: a
                    .detected_in
                    .map(|d| truncate_chars(d.trim(), MAX_DETECTED_IN_LEN))
                    .filter(|d| !d.is_empty()),
            })
        })
        .collect()
}

impl AnalysisResults {
    pub fn from_response(r: ClassifierResponse) -> Self {
        let n = r.nutritional_info;
        let calories = non_negative(n.calories);
        let estimated_portion_g = non_negative(r.estimated_portion_g);
        Self {
            food_items: r
                .food_items
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            confidence_score: clamp_unit(r.confidence_score),
            calories,
            protein_g: non_negative(n.protein_g),
            carbohydrates_g: non_negative(n.carbohydrates_g),
            total_fat_g: non_negative(n.total_fat_g),
            saturated_fat_g: non_negative(n.saturated_fat_g),
            fiber_g: non_negative(n.fiber_g),
            sugar_g: non_negative(n.sugar_g),
            sodium_mg: non_negative(n.sodium_mg),
            estimated_portion_g,
            total_calories: total_calories(calories, estimated_portion_g),
            vitamins: r.vitamins,
            minerals: r.minerals,
            allergens: collect_allergens(r.allergens),
        }
    }
}

fn failure_message(e: &anyhow::Error) -> String {
    truncate_chars(&format!("{e:#}"), MAX_ERROR_LEN)
}

async fn classify(st: &AppState, image: &FoodImage) -> anyhow::Result<Option<ClassifierResponse>> {
    let bytes = images::services::read_image_bytes(st, image).await?;
    let encoded = Base64::encode_string(&bytes);
    st.classifier
        .analyze_food_image(&encoded)
        .await
        .context("classifier call failed")
}

/// Runs the classifier over a stored image and records the outcome.
///
/// Returns `None` only when the image does not exist. Classifier problems are not
/// errors here: they leave the analysis in `failed` with the reason attached.
#[instrument(skip(st))]
pub async fn analyze_food_image(
    st: &AppState,
    image_id: Uuid,
) -> anyhow::Result<Option<AnalysisWithAllergens>> {
    let Some(image) = images::repo::find_by_id(&st.db, image_id).await? else {
        return Ok(None);
    };

    let started = repo::start_processing(&st.db, image.id, st.classifier.model_name()).await?;
    info!(analysis_id = %started.id, %image_id, model = st.classifier.model_name(), "analysis started");

    let timer = Instant::now();
    let outcome = classify(st, &image).await;
    let elapsed_ms = timer.elapsed().as_millis() as i64;

    let analysis = match outcome {
        Ok(Some(response)) => {
            let results = AnalysisResults::from_response(response);
            match repo::complete(&st.db, started.id, &results, elapsed_ms).await {
                Ok(done) => {
                    info!(analysis_id = %done.id, elapsed_ms, allergens = results.allergens.len(), "analysis completed");
                    done
                }
                Err(e) => {
                    warn!(error = %e, analysis_id = %started.id, "saving analysis results failed");
                    repo::fail(&st.db, started.id, &failure_message(&e), elapsed_ms).await?
                }
            }
        }
        Ok(None) => {
            warn!(analysis_id = %started.id, "classifier returned no result");
            repo::fail(&st.db, started.id, NO_RESULT_MESSAGE, elapsed_ms).await?
        }
        Err(e) => {
            warn!(error = %e, analysis_id = %started.id, "analysis failed");
            repo::fail(&st.db, started.id, &failure_message(&e), elapsed_ms).await?
        }
    };

    let allergens = repo::detections_for(&st.db, analysis.id).await?;
    Ok(Some(AnalysisWithAllergens { analysis, allergens }))
}

pub async fn get_analysis_with_allergens(
    st: &AppState,
    analysis_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<AnalysisWithAllergens>> {
    let Some(analysis) = repo::find_for_user(&st.db, analysis_id, user_id).await? else {
        return Ok(None);
    };
    let allergens = repo::detections_for(&st.db, analysis.id).await?;
    Ok(Some(AnalysisWithAllergens { analysis, allergens }))
}

pub async fn get_analysis_for_image(
    st: &AppState,
    image_id: Uuid,
) -> anyhow::Result<Option<AnalysisWithAllergens>> {
    let Some(analysis) = repo::find_by_image(&st.db, image_id).await? else {
        return Ok(None);
    };
    let allergens = repo::detections_for(&st.db, analysis.id).await?;
    Ok(Some(AnalysisWithAllergens { analysis, allergens }))
}

pub async fn get_recent_analyses(
    st: &AppState,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<NutritionalAnalysis>> {
    repo::list_recent_for_user(&st.db, user_id, limit.clamp(1, MAX_HISTORY_LIMIT)).await
}

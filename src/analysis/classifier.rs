use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-100g nutrition facts reported by a classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionalInfo {
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub total_fat_g: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedAllergen {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_allergen_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub detected_in: Option<String>,
}

fn default_allergen_confidence() -> f64 {
    0.5
}

/// What a classifier says about one image. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierResponse {
    pub food_items: Vec<String>,
    pub confidence_score: f64,
    pub nutritional_info: NutritionalInfo,
    pub estimated_portion_g: Option<f64>,
    pub vitamins: BTreeMap<String, serde_json::Value>,
    pub minerals: BTreeMap<String, serde_json::Value>,
    pub allergens: Vec<ReportedAllergen>,
}

#[async_trait]
pub trait FoodClassifier: Send + Sync {
    fn model_name(&self) -> &str;

    /// `Ok(None)` means the classifier produced no usable answer.
    async fn analyze_food_image(
        &self,
        image_b64: &str,
    ) -> anyhow::Result<Option<ClassifierResponse>>;
}

/// Placeholder classifier: ignores the image and returns a fixed sample analysis.
#[derive(Debug, Clone)]
pub struct StubClassifier {
    model: String,
}

impl StubClassifier {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn sample_response() -> ClassifierResponse {
        let map = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
                .collect::<BTreeMap<_, _>>()
        };
        ClassifierResponse {
            food_items: vec!["mixed salad".into(), "grilled chicken".into()],
            confidence_score: 0.85,
            nutritional_info: NutritionalInfo {
                calories: Some(185.0),
                protein_g: Some(25.3),
                carbohydrates_g: Some(8.2),
                total_fat_g: Some(6.1),
                saturated_fat_g: Some(1.4),
                fiber_g: Some(3.2),
                sugar_g: Some(4.1),
                sodium_mg: Some(320.0),
            },
            estimated_portion_g: Some(250.0),
            vitamins: map(&[
                ("vitamin_c_mg", 35.2),
                ("vitamin_a_iu", 1250.0),
                ("folate_mcg", 65.0),
            ]),
            minerals: map(&[
                ("calcium_mg", 85.0),
                ("iron_mg", 2.8),
                ("potassium_mg", 420.0),
            ]),
            allergens: vec![ReportedAllergen {
                name: "dairy".into(),
                confidence: 0.2,
                detected_in: Some("possible dressing".into()),
            }],
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new("food-vision-ai")
    }
}

#[async_trait]
impl FoodClassifier for StubClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze_food_image(
        &self,
        image_b64: &str,
    ) -> anyhow::Result<Option<ClassifierResponse>> {
        info!(model = %self.model, payload_len = image_b64.len(), "generated sample food analysis");
        Ok(Some(Self::sample_response()))
    }
}

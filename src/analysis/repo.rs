use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::allergens;
use crate::analysis::repo_types::{
    AllergenDetection, AllergenDetectionRow, AnalysisResults, AnalysisStatus,
    NutritionalAnalysis, NutritionalAnalysisRow,
};

const ANALYSIS_COLUMNS: &str = r#"
    id, food_image_id, status, food_items, confidence_score,
    calories, protein_g, carbohydrates_g, total_fat_g, saturated_fat_g,
    fiber_g, sugar_g, sodium_mg, estimated_portion_g, total_calories,
    vitamins, minerals, ai_model_used, processing_time_ms, error_message,
    created_at, updated_at
"#;

/// Puts the image's analysis row into `processing`, creating it or wiping a previous result.
pub async fn start_processing(
    db: &PgPool,
    food_image_id: Uuid,
    model: &str,
) -> anyhow::Result<NutritionalAnalysis> {
    let row = sqlx::query_as::<_, NutritionalAnalysisRow>(&format!(
        r#"
        INSERT INTO nutritional_analyses (food_image_id, status, ai_model_used)
        VALUES ($1, $2, $3)
        ON CONFLICT (food_image_id) DO UPDATE
           SET status              = EXCLUDED.status,
               ai_model_used       = EXCLUDED.ai_model_used,
               food_items          = '{{}}',
               confidence_score    = NULL,
               calories            = NULL,
               protein_g           = NULL,
               carbohydrates_g     = NULL,
               total_fat_g         = NULL,
               saturated_fat_g     = NULL,
               fiber_g             = NULL,
               sugar_g             = NULL,
               sodium_mg           = NULL,
               estimated_portion_g = NULL,
               total_calories      = NULL,
               vitamins            = '{{}}'::jsonb,
               minerals            = '{{}}'::jsonb,
               processing_time_ms  = NULL,
               error_message       = NULL,
               updated_at          = now()
        RETURNING {ANALYSIS_COLUMNS}
        "#
    ))
    .bind(food_image_id)
    .bind(AnalysisStatus::Processing.as_str())
    .bind(model)
    .fetch_one(db)
    .await
    .context("start analysis")?;

    Ok(row.into())
}

/// Writes a successful result and its allergen detections in one transaction.
pub async fn complete(
    db: &PgPool,
    analysis_id: Uuid,
    results: &AnalysisResults,
    processing_time_ms: i64,
) -> anyhow::Result<NutritionalAnalysis> {
    let mut tx = db.begin().await.context("begin tx")?;

    let row = sqlx::query_as::<_, NutritionalAnalysisRow>(&format!(
        r#"
        UPDATE nutritional_analyses
           SET status              = $2,
               food_items          = $3,
               confidence_score    = $4,
               calories            = $5,
               protein_g           = $6,
               carbohydrates_g     = $7,
               total_fat_g         = $8,
               saturated_fat_g     = $9,
               fiber_g             = $10,
               sugar_g             = $11,
               sodium_mg           = $12,
               estimated_portion_g = $13,
               total_calories      = $14,
               vitamins            = $15,
               minerals            = $16,
               processing_time_ms  = $17,
               error_message       = NULL,
               updated_at          = now()
         WHERE id = $1
        RETURNING {ANALYSIS_COLUMNS}
        "#
    ))
    .bind(analysis_id)
    .bind(AnalysisStatus::Completed.as_str())
    .bind(&results.food_items)
    .bind(results.confidence_score)
    .bind(results.calories)
    .bind(results.protein_g)
    .bind(results.carbohydrates_g)
    .bind(results.total_fat_g)
    .bind(results.saturated_fat_g)
    .bind(results.fiber_g)
    .bind(results.sugar_g)
    .bind(results.sodium_mg)
    .bind(results.estimated_portion_g)
    .bind(results.total_calories)
    .bind(Json(&results.vitamins))
    .bind(Json(&results.minerals))
    .bind(processing_time_ms)
    .fetch_one(&mut *tx)
    .await
    .context("update analysis results")?;

    sqlx::query("DELETE FROM allergen_detections WHERE nutritional_analysis_id = $1")
        .bind(analysis_id)
        .execute(&mut *tx)
        .await
        .context("clear stale detections")?;

    for finding in &results.allergens {
        let allergen = allergens::repo::get_or_create_tx(&mut tx, &finding.name).await?;
        sqlx::query(
            r#"
            INSERT INTO allergen_detections
                (nutritional_analysis_id, allergen_id, confidence_score, detected_in)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(analysis_id)
        .bind(allergen.id)
        .bind(finding.confidence)
        .bind(finding.detected_in.as_deref())
        .execute(&mut *tx)
        .await
        .context("insert allergen detection")?;
    }

    tx.commit().await.context("commit tx")?;
    Ok(row.into())
}

pub async fn fail(
    db: &PgPool,
    analysis_id: Uuid,
    error_message: &str,
    processing_time_ms: i64,
) -> anyhow::Result<NutritionalAnalysis> {
    let row = sqlx::query_as::<_, NutritionalAnalysisRow>(&format!(
        r#"
        UPDATE nutritional_analyses
           SET status             = $2,
               error_message      = $3,
               processing_time_ms = $4,
               updated_at         = now()
         WHERE id = $1
        RETURNING {ANALYSIS_COLUMNS}
        "#
    ))
    .bind(analysis_id)
    .bind(AnalysisStatus::Failed.as_str())
    .bind(error_message)
    .bind(processing_time_ms)
    .fetch_one(db)
    .await
    .context("mark analysis failed")?;

    Ok(row.into())
}

// ---- Queries ----

/// Analysis `analysis_id` if its image belongs to `user_id`.
pub async fn find_for_user(
    db: &PgPool,
    analysis_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<NutritionalAnalysis>> {
    let row = sqlx::query_as::<_, NutritionalAnalysisRow>(
        r#"
        SELECT a.*
          FROM nutritional_analyses a
          JOIN food_images i ON i.id = a.food_image_id
         WHERE a.id = $1 AND i.user_id = $2
        "#,
    )
    .bind(analysis_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get analysis for user")?;

    Ok(row.map(NutritionalAnalysis::from))
}

pub async fn find_by_image(db: &PgPool, food_image_id: Uuid) -> anyhow::Result<Option<NutritionalAnalysis>> {
    let row = sqlx::query_as::<_, NutritionalAnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM nutritional_analyses WHERE food_image_id = $1"
    ))
    .bind(food_image_id)
    .fetch_optional(db)
    .await
    .context("get analysis by image")?;

    Ok(row.map(NutritionalAnalysis::from))
}

/// A user's analyses, most recent first.
pub async fn list_recent_for_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<NutritionalAnalysis>> {
    let rows = sqlx::query_as::<_, NutritionalAnalysisRow>(
        r#"
        SELECT a.*
          FROM nutritional_analyses a
          JOIN food_images i ON i.id = a.food_image_id
         WHERE i.user_id = $1
         ORDER BY a.created_at DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list recent analyses")?;

    Ok(rows.into_iter().map(NutritionalAnalysis::from).collect())
}

pub async fn detections_for(db: &PgPool, analysis_id: Uuid) -> anyhow::Result<Vec<AllergenDetection>> {
    let rows = sqlx::query_as::<_, AllergenDetectionRow>(
        r#"
        SELECT d.id, d.nutritional_analysis_id, d.confidence_score, d.detected_in, d.created_at,
               al.id             AS allergen_id,
               al.name           AS allergen_name,
               al.description    AS allergen_description,
               al.severity_level AS allergen_severity,
               al.is_active      AS allergen_is_active,
               al.created_at     AS allergen_created_at
          FROM allergen_detections d
          JOIN allergens al ON al.id = d.allergen_id
         WHERE d.nutritional_analysis_id = $1
         ORDER BY d.confidence_score DESC, al.name ASC
        "#,
    )
    .bind(analysis_id)
    .fetch_all(db)
    .await
    .context("list allergen detections")?;

    Ok(rows.into_iter().map(AllergenDetection::from).collect())
}

use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};

use crate::allergens::repo_types::{Allergen, AllergenRow, Severity};

/// Looks up an allergen by its (already case-folded) name, creating it on first use.
pub async fn get_or_create_tx(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> anyhow::Result<Allergen> {
    let inserted = sqlx::query_as::<_, AllergenRow>(
        r#"
        INSERT INTO allergens (name, description, severity_level)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        RETURNING id, name, description, severity_level, is_active, created_at
        "#,
    )
    .bind(name)
    .bind(format!("Common allergen: {name}"))
    .bind(Severity::default().as_str())
    .fetch_optional(&mut **tx)
    .await
    .context("insert allergen")?;

    if let Some(row) = inserted {
        tracing::info!(allergen = %row.name, "new allergen category");
        return Ok(row.into());
    }

    let row = sqlx::query_as::<_, AllergenRow>(
        r#"
        SELECT id, name, description, severity_level, is_active, created_at
          FROM allergens
         WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
    .context("select allergen")?;
    Ok(row.into())
}

pub async fn list_active(db: &PgPool) -> anyhow::Result<Vec<Allergen>> {
    let rows = sqlx::query_as::<_, AllergenRow>(
        r#"
        SELECT id, name, description, severity_level, is_active, created_at
          FROM allergens
         WHERE is_active
         ORDER BY name ASC
        "#,
    )
    .fetch_all(db)
    .await
    .context("list allergens")?;
    Ok(rows.into_iter().map(Allergen::from).collect())
}

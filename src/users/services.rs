use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::users::repo_types::{User, UserChanges};

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

/// Trims and lower-cases, then validates.
pub(crate) fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    Ok(email)
}

pub(crate) fn normalize_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation("Name too long".into()));
    }
    Ok(name.to_string())
}

pub async fn create_user(db: &PgPool, email: &str, name: &str) -> ApiResult<User> {
    let email = normalize_email(email)?;
    let name = normalize_name(name)?;
    let user = User::insert_if_absent(db, &name, &email)
        .await?
        .ok_or(ApiError::Conflict("Email already registered"))?;
    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(user)
}

pub async fn get_user_by_email(db: &PgPool, email: &str) -> ApiResult<Option<User>> {
    let email = normalize_email(email)?;
    Ok(User::find_by_email(db, &email).await?)
}

/// Returns the user owning `email`, creating it with `name` on first sight.
/// An existing user's name is never overwritten.
pub async fn get_or_create_user(db: &PgPool, email: &str, name: &str) -> ApiResult<(User, bool)> {
    let email = normalize_email(email)?;
    if let Some(user) = User::find_by_email(db, &email).await? {
        debug!(user_id = %user.id, "existing user");
        return Ok((user, false));
    }

    match create_user(db, &email, name).await {
        Ok(user) => Ok((user, true)),
        // lost a race with a concurrent first visit
        Err(ApiError::Conflict(_)) => {
            let user = User::find_by_email(db, &email)
                .await?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {email} vanished")))?;
            Ok((user, false))
        }
        Err(e) => Err(e),
    }
}

pub async fn update_user(db: &PgPool, user_id: Uuid, changes: UserChanges) -> ApiResult<User> {
    let changes = UserChanges {
        name: changes.name.as_deref().map(normalize_name).transpose()?,
        email: changes.email.as_deref().map(normalize_email).transpose()?,
        is_active: changes.is_active,
    };

    match User::update(db, user_id, &changes).await {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "user updated");
            Ok(user)
        }
        Ok(None) => Err(ApiError::NotFound("User not found")),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(ApiError::Conflict("Email already registered"))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  New@Test.COM ").unwrap(), "new@test.com");
    }

    #[test]
    fn invalid_emails_are_rejected() {
        for bad in ["", "plain", "a@b", "a b@c.d", "@x.io"] {
            assert!(normalize_email(bad).is_err(), "{bad}");
        }
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(!is_valid_email(&long));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(normalize_name("  Test User ").unwrap(), "Test User");
        assert!(normalize_name("   ").is_err());
        assert!(normalize_name(&"x".repeat(101)).is_err());
        assert!(normalize_name(&"é".repeat(100)).is_ok());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn get_or_create_is_idempotent(pool: PgPool) {
        let (first, created) = get_or_create_user(&pool, "new@test.com", "New User")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.name, "New User");

        let (second, created) = get_or_create_user(&pool, "NEW@test.com", "Different Name")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "New User");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn create_user_refuses_taken_email(pool: PgPool) {
        let (user, created) = get_or_create_user(&pool, "taken@test.com", "First").await.unwrap();
        assert!(created);

        let err = create_user(&pool, " TAKEN@test.com ", "Second").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = get_or_create_user(&pool, "fresh@test.com", "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let (again, created) = get_or_create_user(&pool, "taken@test.com", "Third").await.unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn update_changes_only_given_fields(pool: PgPool) {
        let user = create_user(&pool, "test@example.com", "Test User").await.unwrap();
        let updated = update_user(
            &pool,
            user.id,
            UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Test User");
        assert!(!updated.is_active);

        let found = get_user_by_email(&pool, "test@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }
}

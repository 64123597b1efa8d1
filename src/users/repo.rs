use anyhow::Context;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use super::repo_types::User;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("lookup by subject failed: {0}")]
    Lookup(#[source] sqlx::Error),
    #[error("upsert failed ({upsert}) and email fallback failed ({fallback})")]
    Upsert {
        upsert: sqlx::Error,
        #[source]
        fallback: sqlx::Error,
    },
}

/// Resolves an external identity to a user id, creating the row on first
/// sight and refreshing `name` afterwards.
///
/// `google_id` and `email` are separate unique constraints. When the insert
/// collides on `email` (the address is already bound to another or no
/// subject), the existing row matched by email is updated instead.
pub async fn upsert(
    db: &PgPool,
    subject: &str,
    email: &str,
    name: &str,
) -> Result<i64, DirectoryError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE google_id = $1")
        .bind(subject)
        .fetch_optional(db)
        .await
        .map_err(DirectoryError::Lookup)?;

    let upserted = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users (google_id, email, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (google_id) DO UPDATE
            SET name = EXCLUDED.name, updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(subject)
    .bind(email)
    .bind(name)
    .fetch_one(db)
    .await;

    match upserted {
        Ok(id) => {
            debug!(user_id = id, existed = existing.is_some(), "user upserted by subject");
            Ok(id)
        }
        Err(upsert) => {
            warn!(error = %upsert, "upsert by subject failed; updating by email");
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE users
                   SET name = $1, updated_at = NOW()
                 WHERE email = $2
                RETURNING id
                "#,
            )
            .bind(name)
            .bind(email)
            .fetch_one(db)
            .await
            .map_err(|fallback| DirectoryError::Upsert { upsert, fallback })?;
            debug!(user_id = id, "user updated by email");
            Ok(id)
        }
    }
}

/// Updates email and name of the user bound to `subject`. Returns `false`
/// when no such user exists.
pub async fn update_by_subject(
    db: &PgPool,
    subject: &str,
    email: &str,
    name: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
           SET email = $1, name = $2, updated_at = NOW()
         WHERE google_id = $3
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(subject)
    .execute(db)
    .await
    .context("update user by subject")?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, google_id, email, name, created_at, updated_at
          FROM users
         ORDER BY id
        "#,
    )
    .fetch_all(db)
    .await
    .context("list users")?;
    Ok(users)
}

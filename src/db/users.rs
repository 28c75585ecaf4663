use crate::error::AppError;
use crate::models::user::User;
use sqlx::SqlitePool;

/// Inserts an anonymous user row (no email, no password).
pub async fn create_guest(pool: &SqlitePool) -> Result<User, AppError> {
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query("INSERT INTO users (id, email, password_hash) VALUES (?, NULL, NULL)")
        .bind(&id)
        .execute(pool)
        .await?;

    find_by_id(pool, &id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created user".to_string()))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, created_at, updated_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, created_at, updated_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Binds credentials to a guest account.
///
/// Returns `false` when the row already has an email: once set, an email never changes.
/// A concurrent registration that grabbed the same email surfaces as `EmailTaken`.
pub async fn set_credentials(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    password_hash: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET email = ?, password_hash = ?,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND email IS NULL
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::EmailTaken,
        other => AppError::Database(other),
    })?;

    Ok(result.rows_affected() == 1)
}

//! # 결정 세션 데이터베이스 쿼리 모듈
//!
//! 결정 세션의 생성, 조회, 페이로드 갱신, 소프트 삭제를 담당하는 SQL 쿼리 함수들입니다.
//!
//! ## 세션 라이프사이클
//! ```text
//! [생성] create_session() → update_payload() × N → soft_delete() → [삭제됨: 목록/수정에서 제외]
//! ```
//!
//! 모든 조회/수정 쿼리는 `user_id`와 `deleted_at IS NULL`을 함께 조건으로 겁니다.
//! 따라서 다른 사용자의 세션이나 삭제된 세션은 "존재하지 않는 것"(None)으로 보입니다.
//! 같은 세션에 대한 동시 수정은 감지하지 않습니다 (마지막 쓰기가 이김).

use crate::error::AppError;
use crate::models::Session;
use sqlx::SqlitePool;

/// SELECT 절에서 반복해서 쓰는 컬럼 목록
const SESSION_COLUMNS: &str = "id, user_id, payload_json, created_at, updated_at, deleted_at";

/// 새 세션을 만듭니다.
///
/// `created_at`/`updated_at`은 DB의 DEFAULT 값으로 같은 시각이 기록됩니다.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: &str,
    payload_json: &str,
) -> Result<Session, AppError> {
    // UUIDv7: 시간 기반이라 생성 순서대로 정렬됩니다
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, payload_json)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(payload_json)
    .execute(pool)
    .await?;

    // 생성 직후 조회하여 DB가 채운 기본값(created_at 등)이 포함된 완전한 객체를 반환
    get_session(pool, &id, user_id)
        .await?
        .ok_or(AppError::Internal(
            "Failed to retrieve created session".to_string(),
        ))
}

/// 사용자 소유의 살아 있는 세션 하나를 조회합니다.
///
/// 없거나, 다른 사람 것이거나, 삭제됐으면 `None`.
pub async fn get_session(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
) -> Result<Option<Session>, AppError> {
    // format!으로 컬럼 목록만 끼워 넣습니다. 사용자 입력은 모두 bind()로 전달합니다.
    let session = sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ? AND user_id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// 사용자의 세션 목록을 최근 수정순으로 조회합니다.
///
/// `since`가 있으면 그 시각보다 나중에 수정된 세션만 돌려줍니다.
/// 시각은 DB와 같은 `%Y-%m-%dT%H:%M:%S%.3fZ` 형식이어야 문자열 비교가 시간 비교와 일치합니다.
pub async fn list_sessions(
    pool: &SqlitePool,
    user_id: &str,
    since: Option<&str>,
) -> Result<Vec<Session>, AppError> {
    // match로 두 가지 쿼리 중 하나를 고릅니다.
    let sessions = match since {
        Some(since) => {
            sqlx::query_as::<_, Session>(&format!(
                r#"
                SELECT {SESSION_COLUMNS} FROM sessions
                WHERE user_id = ? AND deleted_at IS NULL AND updated_at > ?
                ORDER BY updated_at DESC, id DESC
                "#
            ))
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Session>(&format!(
                r#"
                SELECT {SESSION_COLUMNS} FROM sessions
                WHERE user_id = ? AND deleted_at IS NULL
                ORDER BY updated_at DESC, id DESC
                "#
            ))
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(sessions)
}

/// 최근 수정된 세션을 최대 `limit`개 조회합니다 (패턴 분석용).
pub async fn list_recent_sessions(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Session>, AppError> {
    let sessions = sqlx::query_as::<_, Session>(&format!(
        r#"
        SELECT {SESSION_COLUMNS} FROM sessions
        WHERE user_id = ? AND deleted_at IS NULL
        ORDER BY updated_at DESC, id DESC
        LIMIT ?
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// 페이로드 전체를 교체하고 `updated_at`을 갱신합니다.
///
/// ## 반환값
/// - `Ok(Some(Session))`: 갱신 성공
/// - `Ok(None)`: 없거나 삭제된 세션 → 라우트에서 404 처리
pub async fn update_payload(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    payload_json: &str,
) -> Result<Option<Session>, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET payload_json = ?,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(payload_json)
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    // rows_affected(): UPDATE로 실제 바뀐 행 수. 0이면 대상이 없었다는 뜻
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_session(pool, id, user_id).await
}

/// 세션을 소프트 삭제합니다. 행은 지우지 않고 `deleted_at`만 채웁니다.
///
/// 이미 삭제된 세션이면 `false` (라우트에서 404).
pub async fn soft_delete(pool: &SqlitePool, id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

//! # LLM 사용 기록(Usage Ledger) 쿼리
//!
//! LLM 호출 한 번마다 한 행을 추가(append-only)하고,
//! 쿼터 검사 때는 행 수만 셉니다. 수정/삭제 쿼리는 없습니다.

use crate::error::AppError;
use sqlx::SqlitePool;

/// 사용자의 LLM 호출 횟수 (모든 action 합계)
pub async fn count_usage(pool: &SqlitePool, user_id: &str) -> Result<i64, AppError> {
    // query_as::<_, (i64,)>: 컬럼 하나짜리 행을 튜플로 받습니다.
    let (count,) = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM usage_ledger WHERE user_id = ? AND action LIKE 'llm_%'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// 사용 기록 한 건 추가
pub async fn record_usage(pool: &SqlitePool, user_id: &str, action: &str) -> Result<(), AppError> {
    sqlx::query("INSERT INTO usage_ledger (user_id, action) VALUES (?, ?)")
        .bind(user_id)
        .bind(action)
        .execute(pool)
        .await?;

    Ok(())
}

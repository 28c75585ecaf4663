//! # LLM 사용 쿼터
//!
//! 사용자당 LLM 호출 횟수를 usage ledger의 행 수로 제한합니다.
//!
//! 쿼터 검사(`check_quota`)와 사용 기록(`record_usage`)은 하나의 트랜잭션이 아니며,
//! LLM 호출과도 원자적으로 묶이지 않습니다. 같은 사용자가 거의 동시에 두 번 요청하면
//! 둘 다 검사를 통과해 쿼터를 1회 넘길 수 있습니다. 이 오차는 알려진 동작입니다.

use crate::db;
use crate::error::AppError;
use serde::Serialize;
use sqlx::SqlitePool;

/// 쿼터를 소모하는 LLM 작업 종류 (ledger의 `action` 컬럼 값)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmAction {
    Category,
    Reflect,
    Highlights,
}

impl LlmAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmAction::Category => "llm_category",
            LlmAction::Reflect => "llm_reflect",
            LlmAction::Highlights => "llm_highlights",
        }
    }
}

/// 쿼터 검사 결과
///
/// `remaining`은 "이번 호출을 하고 난 뒤" 남는 횟수입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub remaining: i64,
}

impl QuotaStatus {
    /// 사용 횟수와 한도로 결과를 계산합니다.
    pub fn from_usage(used: i64, quota: i64) -> Self {
        if used >= quota {
            Self {
                allowed: false,
                remaining: 0,
            }
        } else {
            Self {
                allowed: true,
                remaining: quota - used - 1,
            }
        }
    }
}

pub async fn check_quota(
    pool: &SqlitePool,
    user_id: &str,
    quota: i64,
) -> Result<QuotaStatus, AppError> {
    let used = db::count_usage(pool, user_id).await?;
    Ok(QuotaStatus::from_usage(used, quota))
}

pub async fn record_usage(
    pool: &SqlitePool,
    user_id: &str,
    action: LlmAction,
) -> Result<(), AppError> {
    db::record_usage(pool, user_id, action.as_str()).await
}

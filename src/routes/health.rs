//! # 헬스체크(Health Check) 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/health` → `{ "status": "ok" }`
//!
//! 프로세스가 살아 있는지뿐 아니라 DB 연결 풀에서 연결을 하나 빌려 `SELECT 1`이
//! 되는지도 확인합니다. DB가 응답하지 않으면 `500 database_error`가 나갑니다.

use crate::{error::AppError, routes::AppState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// `GET /health`: 서버와 DB 상태를 확인합니다.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;
    Ok(Json(json!({ "status": "ok" })))
}

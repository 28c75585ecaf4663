//! # 결정 마법사(의식) API 라우트 핸들러
//!
//! 세션 하나가 intention → category → reflection → ritual → toss → result → analysis
//! 단계를 지나가는 과정을 서버가 검증하며 진행시킵니다.
//!
//! ## 엔드포인트 목록
//! | 메서드 | 경로 | 핸들러 | 설명 |
//! |--------|------|--------|------|
//! | POST | /api/sessions/{id}/phase | `move_phase` | 한 단계 앞/뒤로 이동 |
//! | POST | /api/sessions/{id}/toss | `toss` | 동전 던지기 (toss 단계에서만) |
//! | POST | /api/sessions/{id}/reaction | `react` | 감정 반응 기록 (result 단계에서만) |
//!
//! 규칙 위반은 모두 `400 invalid_transition`입니다. 규칙 자체는 `services::ritual`에 있고,
//! 여기서는 세션을 읽고 → 규칙을 적용하고 → 다시 저장하는 일만 합니다.

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::{
        parse_body,
        sessions::{load_payload, save_payload},
        AppState,
    },
    services::ritual as ritual_service,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

/// 마법사 단계를 옮깁니다.
///
/// `POST /api/sessions/{id}/phase` + `{ "phase": "reflection" }` → 갱신된 세션
pub async fn move_phase(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SessionResponse>, AppError> {
    let req: MovePhaseRequest = parse_body(&body, AppError::InvalidInput)?;

    let mut payload = load_payload(&state, &id, &user_id).await?;
    let from = ritual_service::current_phase(&payload);
    // RitualError → AppError::Ritual 변환은 `#[from]` 덕분에 `?`로 자동 처리됩니다.
    let to = ritual_service::move_to(&mut payload, req.phase)?;

    let session = save_payload(&state, &id, &user_id, &payload).await?;
    tracing::debug!(session_id = %id, %from, %to, "phase changed");
    Ok(Json(SessionResponse::try_from(session)?))
}

/// 동전을 던집니다.
///
/// `POST /api/sessions/{id}/toss` → `{ "tossResult": "YES", "phase": "result", "revealAfterMs": 1800 }`
///
/// 결과는 즉시 저장되지만, 클라이언트는 `revealAfterMs`만큼 애니메이션을 보여준 뒤 공개합니다.
pub async fn toss(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TossResponse>, AppError> {
    let mut payload = load_payload(&state, &id, &user_id).await?;

    // ThreadRng는 Send가 아니므로 .await 전에 블록을 닫아 drop시킵니다.
    let toss_result = {
        let mut rng = rand::thread_rng();
        ritual_service::toss(&mut payload, &mut rng)?
    };

    save_payload(&state, &id, &user_id, &payload).await?;
    tracing::debug!(session_id = %id, %toss_result, "coin tossed");

    Ok(Json(TossResponse {
        toss_result,
        phase: Phase::Result,
        reveal_after_ms: ritual_service::TOSS_REVEAL_DELAY_MS,
    }))
}

/// 동전 결과를 본 순간의 감정 반응을 기록합니다.
///
/// `POST /api/sessions/{id}/reaction` + `{ "reaction": "Relieved" }`
/// → `{ "reaction", "insight", "score", "phase": "analysis" }`
pub async fn react(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReactionResponse>, AppError> {
    let req: ReactionRequest = parse_body(&body, AppError::InvalidInput)?;

    let mut payload = load_payload(&state, &id, &user_id).await?;
    let (insight, score) = ritual_service::react(&mut payload, req.reaction)?;
    save_payload(&state, &id, &user_id, &payload).await?;

    Ok(Json(ReactionResponse {
        reaction: req.reaction,
        insight,
        score,
        phase: Phase::Analysis,
    }))
}

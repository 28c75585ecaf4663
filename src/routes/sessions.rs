//! # 결정 세션 API 라우트 핸들러
//!
//! 결정 세션의 생성, 조회, 수정(페이로드 병합), 소프트 삭제를 위한 HTTP 핸들러 함수들입니다.
//!
//! ## 엔드포인트 목록
//! | 메서드 | 경로 | 핸들러 | 인증 | 설명 |
//! |--------|------|--------|------|------|
//! | GET | /api/sessions?since= | `list_sessions` | 선택 | 내 세션 목록 (없으면 `[]`) |
//! | POST | /api/sessions | `create_session` | 게스트 자동 생성 | 새 세션 |
//! | GET | /api/sessions/{id} | `get_session` | 필수 | 세션 하나 |
//! | PUT | /api/sessions/{id} | `update_session` | 필수 | 페이로드 병합 |
//! | DELETE | /api/sessions/{id} | `delete_session` | 필수 | 소프트 삭제 |
//!
//! ## 세션 사용 흐름
//! ```text
//! 1. 첫 입력 → POST /sessions (쿠키가 없으면 게스트 계정이 함께 만들어짐)
//! 2. 단계마다 → PUT /sessions/{id} { "payload": { 바뀐 필드만 } }
//! 3. 히스토리 화면 → GET /sessions
//! 4. 지우기 → DELETE /sessions/{id}
//! ```

use crate::{
    db,
    error::AppError,
    middleware::auth::{get_or_create_user, AuthUser, CurrentUser},
    models::*,
    routes::{parse_body, AppState},
    services::ritual as ritual_service,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tower_cookies::Cookies;

/// 내 세션 목록을 최근 수정순으로 조회합니다.
///
/// `GET /api/sessions` → `[{ id, created_at, updated_at, payload }, ...]`
///
/// 쿠키가 없거나 무효면 에러 대신 빈 배열을 돌려줍니다 (첫 방문자도 히스토리 화면을 열 수 있게).
/// `?since=<RFC 3339>`가 있으면 그 시각 이후에 수정된 세션만 돌려줍니다.
/// 저장된 페이로드를 읽을 수 없는 세션은 경고 로그를 남기고 목록에서 뺍니다.
pub async fn list_sessions(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let Some(user_id) = current.user_id else {
        return Ok(Json(Vec::new()));
    };

    // 클라이언트가 보낸 시각을 DB 저장 형식으로 맞춰야 문자열 비교가 시간 비교가 됩니다.
    let since = query
        .since
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(normalize_timestamp)
        .transpose()?;

    let sessions = db::list_sessions(&state.pool, &user_id, since.as_deref()).await?;

    // Vec<Session> → Vec<SessionResponse>
    // 읽을 수 없는 페이로드 하나 때문에 히스토리 전체가 사라지지 않도록 그 행만 건너뜁니다.
    let responses = sessions
        .into_iter()
        .filter_map(|session| {
            let session_id = session.id.clone();
            match SessionResponse::try_from(session) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "skipping unreadable session payload");
                    None
                }
            }
        })
        .collect();
    Ok(Json(responses))
}

/// 새 결정 세션을 만듭니다.
///
/// `POST /api/sessions` + `{ "payload": { "decision": "..." } }` (payload 생략 가능)
///
/// 식별된 사용자가 없으면 게스트 계정을 만들고 세션 쿠키를 발급합니다.
/// 페이로드는 현재 버전으로 정규화되어 저장됩니다.
pub async fn create_session(
    State(state): State<AppState>,
    cookies: Cookies,
    current: CurrentUser,
    body: Bytes,
) -> Result<Json<SessionResponse>, AppError> {
    let user_id = get_or_create_user(&state, &cookies, current).await?;

    // 본문이 아예 없으면 빈 페이로드로 시작합니다.
    let req: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        parse_body(&body, AppError::InvalidPayload)?
    };

    let value = match req.payload {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    };
    let payload = SessionPayload::from_value(value)?;

    let session = db::create_session(&state.pool, &user_id, &payload.to_json_string()?).await?;
    tracing::debug!(session_id = %session.id, %user_id, "session created");

    Ok(Json(SessionResponse::try_from(session)?))
}

/// 세션 하나를 조회합니다.
///
/// `GET /api/sessions/{id}` → `{ id, created_at, updated_at, payload }`
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = db::get_session(&state.pool, &id, &user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(SessionResponse::try_from(session)?))
}

/// 세션 페이로드를 수정합니다.
///
/// `PUT /api/sessions/{id}` + `{ "payload": { 바뀐 필드 } }` → `{ "ok": true }`
///
/// ## 병합 규칙
/// 저장된 페이로드와 요청 페이로드를 얕게 합칩니다. 같은 키는 요청 값이 이기고,
/// 요청에 없는 키는 그대로 남습니다. 알려진 필드에 `null`을 보내면 그 필드가 지워집니다.
///
/// `phase`는 서버가 관리하는 값이라 그대로 덮어쓰지 않습니다. 요청에 있으면
/// `/phase`와 같은 규칙(인접 단계만, 단계별 조건)으로 이동을 시도하고,
/// 규칙에 맞지 않으면 아무것도 저장하지 않고 `400 invalid_transition`을 돌려줍니다.
pub async fn update_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let req: UpdateSessionRequest = parse_body(&body, AppError::InvalidPayload)?;
    let Value::Object(mut update) = req.payload else {
        return Err(PayloadError::NotAnObject.into());
    };

    // 요청한 단계는 병합에서 빼 두었다가 병합이 끝난 뒤 이동 규칙으로 적용합니다.
    let requested_phase = match update.remove("phase") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Phase>(value).map_err(PayloadError::Malformed)?,
        ),
    };

    let prior = load_payload(&state, &id, &user_id).await?;
    let Value::Object(prior) = prior.to_value()? else {
        return Err(PayloadError::NotAnObject.into());
    };

    let mut merged = SessionPayload::from_value(Value::Object(merge_payload(prior, update)))?;
    if let Some(to) = requested_phase {
        ritual_service::move_to(&mut merged, to)?;
    }
    save_payload(&state, &id, &user_id, &merged).await?;

    Ok(Json(json!({ "ok": true })))
}

/// 세션을 소프트 삭제합니다.
///
/// `DELETE /api/sessions/{id}` → `{ "ok": true }`
///
/// 이미 삭제된 세션을 다시 지우면 404입니다.
pub async fn delete_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !db::soft_delete(&state.pool, &id, &user_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::debug!(session_id = %id, %user_id, "session deleted");
    Ok(Json(json!({ "ok": true })))
}

/// 저장된 페이로드를 타입이 있는 구조체로 읽습니다. 없으면 404.
pub(crate) async fn load_payload(
    state: &AppState,
    id: &str,
    user_id: &str,
) -> Result<SessionPayload, AppError> {
    let session = db::get_session(&state.pool, id, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    debug_assert_eq!(session.user_id, user_id);
    Ok(SessionPayload::from_json_str(&session.payload_json)?)
}

/// 페이로드 전체를 저장하고 갱신된 세션을 돌려줍니다.
///
/// 읽은 뒤 저장하기 전에 세션이 삭제됐다면 404입니다.
pub(crate) async fn save_payload(
    state: &AppState,
    id: &str,
    user_id: &str,
    payload: &SessionPayload,
) -> Result<Session, AppError> {
    db::update_payload(&state.pool, id, user_id, &payload.to_json_string()?)
        .await?
        .ok_or(AppError::NotFound)
}

/// RFC 3339 시각을 DB 저장 형식(`%Y-%m-%dT%H:%M:%S%.3fZ`, UTC)으로 바꿉니다.
fn normalize_timestamp(raw: &str) -> Result<String, AppError> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid `since` timestamp: {e}")))?;
    Ok(parsed
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string())
}

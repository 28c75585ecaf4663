//! # LLM API 라우트 핸들러
//!
//! 외부 LLM을 부르는 세 엔드포인트입니다. 모두 비용이 드는 호출이므로 두 겹으로 막습니다.
//!
//! ## 관문 순서
//! ```text
//! IP 레이트 리밋 → 사용자 식별(401) → 사용자 레이트 리밋 → 쿼터(402) → LLM 호출 → 사용 기록
//! ```
//! 사용 기록은 LLM 호출이 성공한 뒤에만 남기므로, 실패한 호출은 쿼터를 소모하지 않습니다.
//!
//! ## 엔드포인트 목록
//! | 메서드 | 경로 | 핸들러 | 응답 |
//! |--------|------|--------|------|
//! | POST | /api/llm/category | `category` | `{ category, reason }` |
//! | POST | /api/llm/reflect | `reflect` | `{ questions, summary, patternHint, remaining }` |
//! | POST | /api/llm/highlights | `highlights` | `{ pattern, guidance, nextAction, remaining }` |

use crate::{
    db,
    error::AppError,
    middleware::auth::CurrentUser,
    models::*,
    routes::{parse_body_or_default, sessions::load_payload, AppState},
    services::{
        quota::{self, LlmAction, QuotaStatus},
        ratelimit::client_ip,
    },
};
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

/// 패턴 분석을 위해 읽어 오는 최근 세션 수
const HIGHLIGHT_SCAN_LIMIT: i64 = 25;
/// LLM에 넘기는 하이라이트 최대 개수
const HIGHLIGHT_MAX: usize = 10;

/// 결정 문장을 세 카테고리 중 하나로 분류합니다.
///
/// `POST /api/llm/category` + `{ "context": "..." }`
///
/// 문맥이 비어 있으면 LLM을 부르지 않고 `others`를 바로 돌려줍니다 (쿼터도 소모하지 않음).
pub async fn category(
    State(state): State<AppState>,
    headers: HeaderMap,
    current: CurrentUser,
    body: Bytes,
) -> Result<Json<CategoryResponse>, AppError> {
    let user_id = pass_rate_limits(&state, &headers, current).await?;

    let req: CategoryRequest = parse_body_or_default(&body);
    let context = req.context.as_deref().unwrap_or_default().trim();
    if context.is_empty() {
        return Ok(Json(CategoryResponse {
            category: Category::Others,
            reason: String::new(),
        }));
    }

    require_quota(&state, &user_id).await?;
    let result = state.llm.categorize(context).await?;
    quota::record_usage(&state.pool, &user_id, LlmAction::Category).await?;

    Ok(Json(CategoryResponse {
        category: result.category,
        reason: result.reason,
    }))
}

/// 성찰 질문과 짧은 요약을 만듭니다.
///
/// `POST /api/llm/reflect` + `{ "context": "..." }` 또는 `{ "sessionId": "..." }`
///
/// `context`가 비어 있고 `sessionId`가 있으면, 저장된 세션(결정, 세 답변, 동전 결과, 반응)으로
/// 문맥을 만듭니다. 둘 다 없으면 일반적인 질문 2~3개를 받습니다.
pub async fn reflect(
    State(state): State<AppState>,
    headers: HeaderMap,
    current: CurrentUser,
    body: Bytes,
) -> Result<Json<ReflectResponse>, AppError> {
    let user_id = pass_rate_limits(&state, &headers, current).await?;
    let status = require_quota(&state, &user_id).await?;

    let req: ReflectRequest = parse_body_or_default(&body);
    let mut context = req.context.unwrap_or_default().trim().to_string();
    if context.is_empty() {
        if let Some(session_id) = req.session_id.as_deref().filter(|s| !s.trim().is_empty()) {
            context = load_payload(&state, session_id, &user_id)
                .await?
                .reflection_context();
        }
    }

    let reflection = state.llm.reflect(&context).await?;
    quota::record_usage(&state.pool, &user_id, LlmAction::Reflect).await?;

    Ok(Json(ReflectResponse {
        questions: reflection.questions,
        summary: reflection.summary,
        pattern_hint: reflection.pattern_hint,
        remaining: status.remaining,
    }))
}

/// 지난 결정들에서 반복되는 패턴을 분석합니다.
///
/// `POST /api/llm/highlights` + `{ "currentSessionId": "..." }`
///
/// ## 처리 과정
/// 1. 최근 수정된 세션 25개를 읽고
/// 2. 지금 보고 있는 세션(`currentSessionId`)은 빼고
/// 3. 결정 문장이나 통찰이 있는 것만 골라 최대 10개를 LLM에 넘깁니다.
///
/// 고를 것이 하나도 없으면 `400 no_highlights`입니다.
pub async fn highlights(
    State(state): State<AppState>,
    headers: HeaderMap,
    current: CurrentUser,
    body: Bytes,
) -> Result<Json<HighlightsResponse>, AppError> {
    let user_id = pass_rate_limits(&state, &headers, current).await?;
    let status = require_quota(&state, &user_id).await?;

    let req: HighlightsRequest = parse_body_or_default(&body);
    let current_id = req
        .current_session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let sessions = db::list_recent_sessions(&state.pool, &user_id, HIGHLIGHT_SCAN_LIMIT).await?;
    let picked: Vec<Highlight> = sessions
        .iter()
        .filter(|s| Some(s.id.as_str()) != current_id)
        // 페이로드가 깨진 세션 하나 때문에 분석 전체가 실패하지 않도록 건너뜁니다.
        .filter_map(|s| match SessionPayload::from_json_str(&s.payload_json) {
            Ok(payload) => payload.highlight(),
            Err(e) => {
                tracing::warn!(session_id = %s.id, error = %e, "skipping unreadable session payload");
                None
            }
        })
        .take(HIGHLIGHT_MAX)
        .collect();

    if picked.is_empty() {
        return Err(AppError::NoHighlights);
    }

    let analysis = state.llm.analyze_highlights(&picked).await?;
    quota::record_usage(&state.pool, &user_id, LlmAction::Highlights).await?;

    Ok(Json(HighlightsResponse {
        pattern: analysis.pattern,
        guidance: analysis.guidance,
        next_action: analysis.next_action,
        remaining: status.remaining,
    }))
}

/// IP 리밋 → 사용자 식별 → 사용자 리밋. 통과하면 사용자 ID를 돌려줍니다.
async fn pass_rate_limits(
    state: &AppState,
    headers: &HeaderMap,
    current: CurrentUser,
) -> Result<String, AppError> {
    let ip = client_ip(headers);
    if !state.ip_limiter.limit(&ip).await? {
        tracing::warn!(%ip, "rate limited by ip");
        return Err(AppError::RateLimited);
    }

    let user_id = current.require()?;
    if !state.user_limiter.limit(&user_id).await? {
        tracing::warn!(%user_id, "rate limited by user");
        return Err(AppError::RateLimited);
    }
    Ok(user_id)
}

async fn require_quota(state: &AppState, user_id: &str) -> Result<QuotaStatus, AppError> {
    let status = quota::check_quota(&state.pool, user_id, state.llm_quota).await?;
    if !status.allowed {
        return Err(AppError::QuotaExceeded);
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use crate::db;
    use crate::routes::test_support::{cookie_pair, TestApp};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
        }))
    }

    async fn llm_server(content: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion(content))
            .mount(&server)
            .await;
        server
    }

    fn base_url(server: &MockServer) -> String {
        format!("{}/v1", server.uri())
    }

    async fn user_id_of(app: &TestApp, cookie: &str) -> String {
        let (_, _, me) = app.call("GET", "/api/me", Some(cookie), None).await;
        me["user"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_reflect_counts_down_quota_then_402() {
        let server = llm_server(json!({
            "questions": ["What would you regret?"],
            "summary": "You want change.",
            "patternHint": "Safety first."
        }))
        .await;
        let app = TestApp::with_limits(&base_url(&server), true, true, 2).await;
        let cookie = app.guest_cookie().await;

        let (status, _, first) = app
            .call("POST", "/api/llm/reflect", Some(&cookie), Some(json!({ "context": "Move?" })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(first["remaining"], json!(1));
        assert_eq!(first["patternHint"], json!("Safety first."));
        assert_eq!(first["questions"], json!(["What would you regret?"]));

        let (_, _, second) = app
            .call("POST", "/api/llm/reflect", Some(&cookie), Some(json!({ "context": "Move?" })))
            .await;
        assert_eq!(second["remaining"], json!(0));

        let (status, _, body) = app
            .call("POST", "/api/llm/reflect", Some(&cookie), Some(json!({ "context": "Move?" })))
            .await;
        assert_eq!(status, 402);
        assert_eq!(body["error"]["code"], json!("quota_exceeded"));
        assert_eq!(body["error"]["remaining"], json!(0));
    }

    #[tokio::test]
    async fn test_rate_limits_and_identity_come_first() {
        let app = TestApp::with_limits("http://unused", false, true, 10).await;
        let (status, _, body) = app
            .call("POST", "/api/llm/category", None, Some(json!({ "context": "x" })))
            .await;
        assert_eq!(status, 429);
        assert_eq!(body["error"]["code"], json!("rate_limit_exceeded"));

        let app = TestApp::with_limits("http://unused", true, true, 10).await;
        let (status, _, body) = app
            .call("POST", "/api/llm/category", None, Some(json!({ "context": "x" })))
            .await;
        assert_eq!(status, 401);
        assert_eq!(body["error"]["code"], json!("unauthorized"));

        let app = TestApp::with_limits("http://unused", true, false, 10).await;
        let cookie = app.guest_cookie().await;
        let (status, _, _) = app
            .call("POST", "/api/llm/reflect", Some(&cookie), Some(json!({ "context": "x" })))
            .await;
        assert_eq!(status, 429);
    }

    #[tokio::test]
    async fn test_category_with_empty_context_skips_llm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({ "category": "career" })))
            .expect(0)
            .mount(&server)
            .await;
        let app = TestApp::new(&base_url(&server)).await;
        let cookie = app.guest_cookie().await;

        let (status, _, body) = app
            .call("POST", "/api/llm/category", Some(&cookie), Some(json!({ "context": "   " })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "category": "others", "reason": "" }));

        let user_id = user_id_of(&app, &cookie).await;
        assert_eq!(db::count_usage(&app.state.pool, &user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_category_normalizes_and_records_usage() {
        let server = llm_server(json!({ "category": "Relationship", "reason": "Partner." })).await;
        let app = TestApp::new(&base_url(&server)).await;
        let cookie = app.guest_cookie().await;

        let (status, _, body) = app
            .call(
                "POST",
                "/api/llm/category",
                Some(&cookie),
                Some(json!({ "context": "Move in together?" })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "category": "relationship", "reason": "Partner." }));

        let user_id = user_id_of(&app, &cookie).await;
        assert_eq!(db::count_usage(&app.state.pool, &user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reflect_builds_context_from_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Adopt a cat?"))
            .respond_with(completion(json!({ "questions": [], "summary": "", "patternHint": "" })))
            .expect(1)
            .mount(&server)
            .await;
        let app = TestApp::new(&base_url(&server)).await;
        let (_, set_cookie, created) = app
            .call(
                "POST",
                "/api/sessions",
                None,
                Some(json!({ "payload": { "decision": "Adopt a cat?" } })),
            )
            .await;
        let cookie = cookie_pair(&set_cookie.unwrap());

        let (status, _, _) = app
            .call(
                "POST",
                "/api/llm/reflect",
                Some(&cookie),
                Some(json!({ "sessionId": created["id"] })),
            )
            .await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_highlights_excludes_current_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Learn piano?"))
            .respond_with(completion(json!({
                "pattern": "You hedge.",
                "guidance": "Commit.",
                "nextAction": "Book a lesson."
            })))
            .expect(1)
            .mount(&server)
            .await;
        let app = TestApp::new(&base_url(&server)).await;

        let (_, set_cookie, _) = app
            .call(
                "POST",
                "/api/sessions",
                None,
                Some(json!({ "payload": { "decision": "Learn piano?" } })),
            )
            .await;
        let cookie = cookie_pair(&set_cookie.unwrap());
        let (_, _, current) = app
            .call(
                "POST",
                "/api/sessions",
                Some(&cookie),
                Some(json!({ "payload": { "decision": "Current one" } })),
            )
            .await;

        let (status, _, body) = app
            .call(
                "POST",
                "/api/llm/highlights",
                Some(&cookie),
                Some(json!({ "currentSessionId": current["id"] })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["nextAction"], json!("Book a lesson."));
        assert_eq!(body["remaining"], json!(9));
    }

    #[tokio::test]
    async fn test_highlights_without_material() {
        let app = TestApp::new("http://unused").await;
        let cookie = app.guest_cookie().await;

        let (status, _, body) = app
            .call("POST", "/api/llm/highlights", Some(&cookie), Some(json!({})))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], json!("no_highlights"));
    }

    #[tokio::test]
    async fn test_llm_failure_is_echoed_and_not_counted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "message": "The model is overloaded" }
            })))
            .mount(&server)
            .await;
        let app = TestApp::new(&base_url(&server)).await;
        let cookie = app.guest_cookie().await;

        let (status, _, body) = app
            .call("POST", "/api/llm/reflect", Some(&cookie), Some(json!({ "context": "x" })))
            .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"]["code"], json!("llm_error"));
        assert_eq!(body["error"]["message"], json!("The model is overloaded"));

        let user_id = user_id_of(&app, &cookie).await;
        assert_eq!(db::count_usage(&app.state.pool, &user_id).await.unwrap(), 0);
    }
}

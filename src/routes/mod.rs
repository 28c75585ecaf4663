//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들과, 그 핸들러들이 공유하는 상태(`AppState`),
//! 그리고 전체 API 라우터(`build_router`)를 모아둔 모듈입니다.
//!
//! 각 하위 모듈:
//! - `auth`: 로그인, 게스트 계정 등록, 로그아웃, 내 정보
//! - `health`: 서버 상태 확인 (헬스체크)
//! - `llm`: 카테고리 분류, 성찰 질문, 패턴 분석 (레이트 리밋 + 쿼터 적용)
//! - `ritual`: 마법사 단계 이동, 동전 던지기, 감정 반응 기록
//! - `sessions`: 결정 세션 CRUD

pub mod auth;
pub mod health;
pub mod llm;
pub mod ritual;
pub mod sessions;

use crate::{
    config::Config,
    error::AppError,
    services::{
        llm::LlmGateway,
        ratelimit::{RateLimiter, UpstashRateLimiter},
        token::TokenCodec,
    },
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// 모든 핸들러가 공유하는 애플리케이션 상태
///
/// `#[derive(Clone)]`: Axum은 요청마다 상태를 복제해서 핸들러에 넘깁니다.
/// 필드는 모두 내부적으로 `Arc`를 쓰거나(풀, HTTP 클라이언트, 리미터) 작은 값이라
/// 복제 비용이 거의 없습니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀
    pub pool: SqlitePool,
    /// 세션 쿠키 토큰 서명/검증기
    pub tokens: TokenCodec,
    /// LLM(chat completions) 호출기
    pub llm: LlmGateway,
    /// IP별 레이트 리미터 (`rl:ip`)
    ///
    /// `Arc<dyn RateLimiter>`: 실제 서비스에서는 Upstash 구현을,
    /// 테스트에서는 가짜 구현을 끼워 넣을 수 있습니다.
    pub ip_limiter: Arc<dyn RateLimiter>,
    /// 사용자별 레이트 리미터 (`rl:user`)
    pub user_limiter: Arc<dyn RateLimiter>,
    /// 사용자당 LLM 호출 한도
    pub llm_quota: i64,
    /// 쿠키에 Secure 플래그를 붙일지 (https 배포)
    pub cookie_secure: bool,
    /// 로그아웃 후 돌아갈 주소, CORS 허용 출처
    pub app_base_url: String,
}

impl AppState {
    /// 설정값으로 상태를 조립합니다.
    ///
    /// `client`는 LLM과 레이트 리미터가 함께 쓰는 HTTP 클라이언트입니다.
    /// reqwest::Client도 내부가 Arc라서 복제해도 연결 풀을 공유합니다.
    pub fn from_config(config: &Config, pool: SqlitePool, client: reqwest::Client) -> Self {
        let limiter = |prefix: &str| -> Arc<dyn RateLimiter> {
            Arc::new(UpstashRateLimiter::new(
                client.clone(),
                config.ratelimit_url.clone(),
                config.ratelimit_token.clone(),
                prefix,
                config.rate_limit_max,
                config.rate_limit_window_secs,
            ))
        };

        Self {
            tokens: TokenCodec::new(&config.auth_token_secret),
            llm: LlmGateway::new(
                client.clone(),
                config.llm_base_url.clone(),
                config.llm_api_key.clone(),
                config.llm_model.clone(),
            ),
            ip_limiter: limiter("rl:ip"),
            user_limiter: limiter("rl:user"),
            llm_quota: config.llm_quota,
            cookie_secure: config.cookie_secure(),
            app_base_url: config.app_base_url.clone(),
            pool,
        }
    }
}

/// `/api` 아래의 모든 라우트를 조립합니다.
///
/// 레이어 순서 (바깥 → 안):
/// 1. `TraceLayer`: 요청/응답 로그
/// 2. `CorsLayer`: APP_BASE_URL 출처만 쿠키와 함께 허용
/// 3. `CookieManagerLayer`: 핸들러에서 `Cookies` 추출기를 쓸 수 있게 함
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // 인증
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(auth::me))
        // 결정 세션 CRUD
        // Axum 0.8부터 경로 파라미터는 `{id}` 문법입니다.
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        // 마법사(의식) 단계
        .route("/sessions/{id}/phase", post(ritual::move_phase))
        .route("/sessions/{id}/toss", post(ritual::toss))
        .route("/sessions/{id}/reaction", post(ritual::react))
        // LLM
        .route("/llm/category", post(llm::category))
        .route("/llm/reflect", post(llm::reflect))
        .route("/llm/highlights", post(llm::highlights))
        // 헬스체크
        .route("/health", get(health::health_check));

    // 쿠키 인증을 쓰므로 출처를 와일드카드(Any)로 열 수 없습니다.
    // allow_credentials(true)와 Any를 같이 쓰면 tower-http가 패닉합니다.
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);
    match HeaderValue::from_str(&state.app_base_url) {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!(
            base_url = %state.app_base_url,
            "APP_BASE_URL is not a valid origin header, cross-origin requests are disabled"
        ),
    }

    Router::new()
        .nest("/api", api_routes)
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 요청 본문을 JSON으로 읽습니다. 실패하면 `on_error`가 만든 에러를 돌려줍니다.
///
/// `Json<T>` 추출기 대신 이 함수를 쓰는 이유는, 본문이 깨졌을 때의 에러 코드를
/// 엔드포인트마다 다르게(`invalid_input`, `invalid_payload`) 정하기 위해서입니다.
pub(crate) fn parse_body<T, F>(body: &[u8], on_error: F) -> Result<T, AppError>
where
    T: DeserializeOwned,
    F: FnOnce(String) -> AppError,
{
    serde_json::from_slice(body).map_err(|e| on_error(e.to_string()))
}

/// 본문이 비어 있거나 JSON이 아니면 기본값을 씁니다 (LLM 엔드포인트용).
pub(crate) fn parse_body_or_default<T>(body: &[u8]) -> T
where
    T: DeserializeOwned + Default,
{
    serde_json::from_slice(body).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 라우터 수준 테스트에서 쓰는 공용 도구

    use super::*;
    use crate::db::test_pool;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, response::Response};
    use serde_json::Value;
    use tower::ServiceExt;

    /// 항상 같은 답을 하는 가짜 리미터
    pub struct StaticLimiter(pub bool);

    #[async_trait]
    impl RateLimiter for StaticLimiter {
        async fn limit(&self, _identifier: &str) -> Result<bool, AppError> {
            Ok(self.0)
        }
    }

    pub struct TestApp {
        pub state: AppState,
        pub router: Router,
    }

    impl TestApp {
        /// 메모리 DB와 주어진 LLM 주소로 앱을 만듭니다. 리미터는 모두 허용.
        pub async fn new(llm_base_url: &str) -> Self {
            Self::with_limits(llm_base_url, true, true, 10).await
        }

        pub async fn with_limits(
            llm_base_url: &str,
            ip_allowed: bool,
            user_allowed: bool,
            llm_quota: i64,
        ) -> Self {
            let state = AppState {
                pool: test_pool().await,
                tokens: TokenCodec::new("test-secret"),
                llm: LlmGateway::new(
                    reqwest::Client::new(),
                    llm_base_url,
                    "sk-test",
                    "gpt-4o-mini",
                ),
                ip_limiter: Arc::new(StaticLimiter(ip_allowed)),
                user_limiter: Arc::new(StaticLimiter(user_allowed)),
                llm_quota,
                cookie_secure: false,
                app_base_url: "http://localhost:3000".to_string(),
            };
            let router = build_router(state.clone());
            Self { state, router }
        }

        /// `APP_BASE_URL`이 https인 배포처럼 `Secure` 쿠키를 발급하는 앱
        pub async fn with_secure_cookies(llm_base_url: &str) -> Self {
            let mut app = Self::new(llm_base_url).await;
            app.state.cookie_secure = true;
            app.router = build_router(app.state.clone());
            app
        }

        /// 요청 하나를 보내고 (상태 코드, Set-Cookie 값, JSON 본문)을 돌려줍니다.
        pub async fn call(
            &self,
            method: &str,
            uri: &str,
            cookie: Option<&str>,
            body: Option<Value>,
        ) -> (u16, Option<String>, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(cookie) = cookie {
                request = request.header("cookie", cookie);
            }
            let body = match body {
                Some(json) => {
                    request = request.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response: Response = self
                .router
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();

            let status = response.status().as_u16();
            let set_cookie = response
                .headers()
                .get("set-cookie")
                .map(|v| v.to_str().unwrap().to_string());
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, set_cookie, json)
        }

        /// 게스트 계정을 하나 만들고 그 쿠키(`name=value`)를 돌려줍니다.
        pub async fn guest_cookie(&self) -> String {
            let (status, set_cookie, _) = self
                .call("POST", "/api/sessions", None, Some(serde_json::json!({})))
                .await;
            assert_eq!(status, 200);
            cookie_pair(&set_cookie.expect("guest cookie"))
        }
    }

    /// Set-Cookie 헤더에서 `name=value` 부분만 떼어냅니다.
    pub fn cookie_pair(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

//! # 에러 처리 모듈
//!
//! 애플리케이션에서 발생할 수 있는 모든 에러 타입을 정의합니다.
//! Rust에서는 예외(exception) 대신 `Result<T, E>` 타입으로 에러를 처리합니다.
//!
//! 이 모듈의 핵심:
//! - `AppError` 열거형(enum): 모든 에러 종류를 하나의 타입으로 통합
//! - `IntoResponse` 구현: 에러를 HTTP 응답으로 자동 변환
//!
//! 응답 본문 형태:
//! ```text
//! { "error": { "code": "email_taken", "message": "..." } }
//! ```
//! 클라이언트는 `code`로 분기하고, `message`는 사람이 읽는 설명입니다.

use crate::models::PayloadError;
use crate::services::ritual::RitualError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 애플리케이션에서 발생할 수 있는 모든 에러 종류
///
/// 핸들러에서 `Result<T, AppError>`를 반환하면,
/// Axum이 자동으로 `IntoResponse`를 호출하여 HTTP 응답으로 변환합니다.
#[derive(Debug, Error)]
pub enum AppError {
    /// 요청한 리소스를 찾을 수 없음 (HTTP 404)
    /// 삭제된 세션, 다른 사용자의 세션도 여기에 해당합니다.
    #[error("Resource not found")]
    NotFound,

    /// 입력값 검증 실패 (HTTP 400)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 세션 페이로드가 객체가 아니거나 형식이 틀림 (HTTP 400)
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// 이미 이메일이 등록된 계정으로 다시 가입 시도 (HTTP 400)
    #[error("Account is already registered")]
    AlreadyRegistered,

    /// 패턴 분석에 쓸 과거 세션이 없음 (HTTP 400)
    #[error("No past sessions to analyze")]
    NoHighlights,

    /// 마법사 단계 전이 규칙 위반 (HTTP 400)
    /// #[from]: RitualError → AppError 자동 변환
    #[error(transparent)]
    Ritual(#[from] RitualError),

    /// 인증 실패 (HTTP 401)
    /// 토큰이 없든, 만료됐든, 변조됐든 구분하지 않습니다.
    #[error("Unauthorized")]
    Unauthorized,

    /// 이메일/비밀번호 불일치 (HTTP 401)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// LLM 사용 쿼터 소진 (HTTP 402)
    #[error("LLM quota exceeded")]
    QuotaExceeded,

    /// 다른 계정이 이미 쓰는 이메일 (HTTP 409)
    #[error("Email is already in use")]
    EmailTaken,

    /// 레이트 리밋 초과 (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// LLM 호출 실패 (HTTP 500)
    /// 진단을 위해 상위(upstream) 에러 메시지를 그대로 전달합니다.
    #[error("LLM error: {0}")]
    Llm(String),

    /// 레이트 리미터 서비스 호출 실패 (HTTP 500)
    #[error("Rate limiter error: {0}")]
    RateLimiter(String),

    /// 서버 내부 오류 (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// 데이터베이스 오류 (HTTP 500)
    /// #[from]: sqlx::Error를 `?`로 바로 전파할 수 있게 합니다.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// 클라이언트가 분기에 사용하는 안정적인 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::AlreadyRegistered => "already_registered",
            AppError::NoHighlights => "no_highlights",
            AppError::Ritual(_) => "invalid_transition",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::QuotaExceeded => "quota_exceeded",
            AppError::EmailTaken => "email_taken",
            AppError::RateLimited => "rate_limit_exceeded",
            AppError::Llm(_) => "llm_error",
            AppError::RateLimiter(_) => "rate_limiter_error",
            AppError::Internal(_) => "internal_error",
            AppError::Database(_) => "database_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::InvalidPayload(_)
            | AppError::AlreadyRegistered
            | AppError::NoHighlights
            | AppError::Ritual(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::EmailTaken => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Llm(_)
            | AppError::RateLimiter(_)
            | AppError::Internal(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// 페이로드 해석 에러는 항상 클라이언트 입력 문제로 봅니다.
impl From<PayloadError> for AppError {
    fn from(err: PayloadError) -> Self {
        AppError::InvalidPayload(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// AppError를 HTTP 응답으로 변환합니다.
    ///
    /// 내부 에러(Database, Internal, RateLimiter)는 실제 에러 내용을 로그에만 기록하고,
    /// 클라이언트에는 일반적인 메시지만 반환합니다.
    /// LLM 에러만 예외적으로 상위 메시지를 그대로 돌려줍니다.
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "A database error occurred".to_string()
            }
            AppError::RateLimiter(msg) => {
                tracing::error!("Rate limiter error: {}", msg);
                "Rate limiter unavailable".to_string()
            }
            AppError::Llm(detail) => {
                tracing::error!("LLM error: {}", detail);
                detail.clone()
            }
            other => other.to_string(),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if matches!(self, AppError::QuotaExceeded) {
            error["remaining"] = json!(0);
        }
        let body = Json(json!({ "error": error }));

        // LLM 에러 응답은 캐시되면 안 됩니다 (재시도는 사용자가 직접 다시 누름).
        if matches!(self, AppError::Llm(_)) {
            return (status, [(header::CACHE_CONTROL, "no-store")], body).into_response();
        }
        (status, body).into_response()
    }
}

//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 필수 항목 (없거나 자리표시자 `...`이면 서버가 시작되지 않습니다):
//! - `DATABASE_URL`: SQLite 데이터베이스 경로
//! - `AUTH_TOKEN_SECRET`: 세션 토큰 HMAC 서명용 비밀키
//! - `RATELIMIT_REST_URL` / `RATELIMIT_REST_TOKEN`: 외부 레이트 리미터(REST) 접속 정보
//! - `LLM_API_KEY`: LLM(chat completions) API 키
//! - `APP_BASE_URL`: 프론트엔드 기준 URL (CORS 허용 출처, 로그아웃 리다이렉트)
//!
//! 선택 항목 (기본값 있음):
//! - `LLM_BASE_URL`, `LLM_MODEL`, `LLM_QUOTA`
//! - `RATE_LIMIT_MAX`, `RATE_LIMIT_WINDOW_SECS`
//! - `FRONTEND_DIST`, `HOST`, `PORT`

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// 설정 로딩 중 발생할 수 있는 에러
///
/// 어느 쪽이든 서버 시작 단계에서 치명적(fatal)으로 처리됩니다.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 필수 환경변수가 없거나 자리표시자("...")로 남아 있음
    #[error("Missing required env: {0}")]
    Missing(&'static str),

    /// 값은 있지만 원하는 타입으로 파싱할 수 없음 (예: PORT=abc)
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 애플리케이션 전체 설정을 담는 구조체
///
/// 서버 시작 시 환경변수에서 한 번 읽어온 후,
/// `AppState`를 만드는 데 사용됩니다.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 URL (예: "sqlite:kettei.db")
    pub database_url: String,
    /// 세션 토큰 서명/검증에 사용하는 비밀키
    pub auth_token_secret: String,
    /// 프론트엔드 기준 URL (예: "https://kettei.app")
    pub app_base_url: String,
    /// 레이트 리미터 REST 엔드포인트
    pub ratelimit_url: String,
    /// 레이트 리미터 REST 인증 토큰
    pub ratelimit_token: String,
    /// LLM API 키
    pub llm_api_key: String,
    /// LLM API 기준 URL (OpenAI 호환)
    pub llm_base_url: String,
    /// 사용할 모델 이름
    pub llm_model: String,
    /// 사용자당 LLM 호출 허용 횟수
    pub llm_quota: i64,
    /// 슬라이딩 윈도우당 허용 요청 수
    pub rate_limit_max: u32,
    /// 슬라이딩 윈도우 길이(초)
    pub rate_limit_window_secs: u64,
    /// 빌드된 프론트엔드 정적 파일 디렉토리
    pub frontend_dist: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 3000)
    pub port: u16,
}

impl Config {
    /// 프로세스 환경변수에서 설정을 읽습니다.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정을 읽습니다.
    ///
    /// `from_env()`는 이 함수에 `env::var`를 넘길 뿐이며,
    /// 테스트에서는 HashMap 기반 조회 함수를 넘겨 환경변수를 건드리지 않습니다.
    ///
    /// `F: Fn(&str) -> Option<String>`: "키를 받아 값(있을 수도 없을 수도)을 돌려주는 함수"라는 제약
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 필수 값: 없거나 "..."이면 즉시 Missing 에러
        let required = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() && value != "..." => Ok(value),
                _ => Err(ConfigError::Missing(key)),
            }
        };
        // 선택 값: 없으면 기본값
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            auth_token_secret: required("AUTH_TOKEN_SECRET")?,
            app_base_url: required("APP_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            ratelimit_url: required("RATELIMIT_REST_URL")?,
            ratelimit_token: required("RATELIMIT_REST_TOKEN")?,
            llm_api_key: required("LLM_API_KEY")?,

            llm_base_url: optional("LLM_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            llm_model: optional("LLM_MODEL", "gpt-4o-mini"),
            llm_quota: parse("LLM_QUOTA", optional("LLM_QUOTA", "10"))?,
            rate_limit_max: parse("RATE_LIMIT_MAX", optional("RATE_LIMIT_MAX", "10"))?,
            rate_limit_window_secs: parse(
                "RATE_LIMIT_WINDOW_SECS",
                optional("RATE_LIMIT_WINDOW_SECS", "60"),
            )?,
            frontend_dist: optional("FRONTEND_DIST", "frontend/dist"),
            host: optional("HOST", "0.0.0.0"),
            port: parse("PORT", optional("PORT", "3000"))?,
        })
    }

    /// 기준 URL이 https이면 쿠키에 Secure 속성을 붙입니다.
    pub fn cookie_secure(&self) -> bool {
        self.app_base_url.starts_with("https://")
    }
}

/// 문자열을 숫자 등으로 파싱하고, 실패하면 어떤 키가 잘못됐는지 알려줍니다.
///
/// 잘못된 숫자 설정은 기본값으로 대체하지 않고 시작 단계에서 실패시킵니다.
fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

//! # 슬라이딩 윈도우 레이트 리미터
//!
//! LLM 엔드포인트 앞에서 IP별, 사용자별 요청 빈도를 제한합니다.
//! 카운터는 프로세스 안이 아니라 외부 Redis(REST 인터페이스, Upstash 호환)에 있으므로
//! 서버가 여러 대여도 같은 한도를 공유합니다.
//!
//! ## 알고리즘
//! 고정 윈도우 두 개(현재/직전)를 겹쳐 근사하는 슬라이딩 윈도우입니다.
//! ```text
//! 추정 요청 수 = 현재 윈도우 수 + 직전 윈도우 수 × (현재 윈도우에서 아직 지나지 않은 비율)
//! ```
//! 계산과 증가는 Redis 안의 Lua 스크립트 하나로 원자적으로 처리합니다.

use crate::error::AppError;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

/// Redis에서 실행되는 슬라이딩 윈도우 스크립트
///
/// 허용되면 남은 요청 수(0 이상), 거절되면 -1을 돌려줍니다.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local current_key = KEYS[1]
local previous_key = KEYS[2]
local tokens = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local increment = tonumber(ARGV[4])

local current = tonumber(redis.call("GET", current_key) or "0")
local previous = tonumber(redis.call("GET", previous_key) or "0")
local elapsed = (now % window) / window
previous = math.floor((1 - elapsed) * previous)

if previous + current >= tokens then
  return -1
end

local updated = redis.call("INCRBY", current_key, increment)
if updated == increment then
  redis.call("PEXPIRE", current_key, window * 2 + 1000)
end
return tokens - (updated + previous)
"#;

/// 키(IP 또는 사용자 ID)별 요청 허용 여부를 판단하는 리미터
///
/// `#[async_trait]`: `Arc<dyn RateLimiter>`로 담을 수 있도록 비동기 메서드를 박싱합니다.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// 요청 한 건을 소비합니다. 허용되면 true, 한도를 넘었으면 false.
    async fn limit(&self, identifier: &str) -> Result<bool, AppError>;
}

/// Upstash 호환 Redis REST 엔드포인트를 쓰는 리미터
#[derive(Clone)]
pub struct UpstashRateLimiter {
    client: reqwest::Client,
    url: String,
    token: String,
    /// 키 접두사 (예: "rl:ip", "rl:user")
    prefix: String,
    /// 윈도우당 허용 요청 수
    max_requests: u32,
    /// 윈도우 길이(ms)
    window_ms: u64,
}

/// REST 응답: 성공이면 `{"result": ...}`, 실패면 `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashRateLimiter {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        token: impl Into<String>,
        prefix: impl Into<String>,
        max_requests: u32,
        window_secs: u64,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            token: token.into(),
            prefix: prefix.into(),
            max_requests,
            window_ms: window_secs.max(1) * 1000,
        }
    }

    /// 현재/직전 윈도우의 Redis 키를 만듭니다.
    fn window_keys(&self, identifier: &str, now_ms: u64) -> (String, String) {
        let bucket = now_ms / self.window_ms;
        (
            format!("{}:{}:{}", self.prefix, identifier, bucket),
            format!("{}:{}:{}", self.prefix, identifier, bucket.saturating_sub(1)),
        )
    }
}

#[async_trait]
impl RateLimiter for UpstashRateLimiter {
    async fn limit(&self, identifier: &str) -> Result<bool, AppError> {
        // 시계가 1970년 이전일 수는 없으므로 음수면 0으로 취급합니다.
        let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let (current_key, previous_key) = self.window_keys(identifier, now_ms);

        // Redis 명령을 JSON 배열로 보냅니다: EVAL script numkeys key1 key2 arg1 ...
        let command = json!([
            "EVAL",
            SLIDING_WINDOW_SCRIPT,
            "2",
            current_key,
            previous_key,
            self.max_requests.to_string(),
            now_ms.to_string(),
            self.window_ms.to_string(),
            "1",
        ]);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| AppError::RateLimiter(e.to_string()))?;

        let status = response.status();
        let body: RestResponse = response
            .json()
            .await
            .map_err(|e| AppError::RateLimiter(format!("{status}: {e}")))?;

        if let Some(error) = body.error {
            return Err(AppError::RateLimiter(error));
        }
        let remaining = body
            .result
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::RateLimiter(format!("{status}: missing result")))?;

        tracing::debug!(
            prefix = %self.prefix,
            identifier,
            remaining,
            "rate limit evaluated"
        );
        Ok(remaining >= 0)
    }
}

/// 요청을 보낸 클라이언트의 IP
///
/// 프록시 뒤에 있다고 보고 `X-Forwarded-For`의 첫 항목, 없으면 `X-Real-IP`,
/// 둘 다 없으면 `127.0.0.1`을 씁니다.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("127.0.0.1")
        .to_string()
}

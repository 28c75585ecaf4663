//! # 세션 토큰 코덱
//!
//! 쿠키에 담기는 세션 토큰을 만들고 검증합니다.
//!
//! ## 토큰 형식
//! ```text
//! {"userId":"0190...","exp":1767225600}.3f9a...(HMAC-SHA256 16진수)
//! ```
//! - 앞부분: 사용자 ID와 만료 시각(unix 초)을 담은 JSON
//! - 뒷부분: 서버 비밀키로 앞부분을 서명한 HMAC-SHA256 값
//!
//! 서버는 토큰을 저장하지 않습니다(stateless). 따라서 만료 전에는 서버에서 취소할 수 없고,
//! 비밀키가 바뀌면 기존 토큰은 모두 무효가 됩니다.

use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// 세션 토큰(과 쿠키)의 유효 기간
pub const SESSION_TTL_DAYS: i64 = 30;

type HmacSha256 = Hmac<Sha256>;

/// 토큰에 담기는 클레임
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// 만료 시각 (unix 초)
    pub exp: i64,
}

/// 서버 비밀키를 들고 있는 서명기/검증기
///
/// `Clone`: `AppState`에 담겨 요청마다 복제됩니다. 비밀키 바이트만 복사하므로 가볍습니다.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

// 비밀키가 로그에 찍히지 않도록 Debug를 직접 구현합니다.
impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC은 어떤 길이의 키도 받아들이므로 이 호출은 실패하지 않습니다.
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    /// `payload + "." + hex(hmac)` 형태의 토큰을 만듭니다.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    /// 서명을 검증하고, 맞으면 페이로드 부분을 돌려줍니다.
    ///
    /// - 마지막 `.`을 기준으로 자릅니다 (페이로드 안에 `.`이 있어도 안전).
    /// - 서명이 소문자 16진수가 아니거나 길이가 다르면 즉시 무효.
    /// - 비교는 `verify_slice`의 상수 시간(constant-time) 비교를 사용합니다.
    ///
    /// 만료 검사는 하지 않습니다. 그건 `decode`의 몫입니다.
    pub fn verify<'a>(&self, token: &'a str) -> Option<&'a str> {
        let (payload, signature) = token.rsplit_once('.')?;
        // hex::decode는 대문자도 받아들이므로, 발급 형식(소문자)이 아니면 먼저 거절합니다.
        if !signature
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return None;
        }
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(payload)
    }

    /// 사용자에게 `now`부터 30일간 유효한 토큰을 발급합니다.
    pub fn issue(&self, user_id: &str, now: i64) -> String {
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            exp: now + Duration::days(SESSION_TTL_DAYS).num_seconds(),
        };
        // 문자열과 정수만 있는 구조체라 직렬화가 실패할 수 없습니다.
        let payload = serde_json::to_string(&claims)
            .unwrap_or_else(|_| unreachable!("claims always serialize"));
        self.sign(&payload)
    }

    /// 토큰을 검증하고 만료되지 않았으면 클레임을 돌려줍니다.
    ///
    /// 서명 불일치, JSON 형식 오류, 만료 모두 똑같이 None입니다.
    pub fn decode(&self, token: &str, now: i64) -> Option<SessionClaims> {
        let payload = self.verify(token)?;
        let claims: SessionClaims = serde_json::from_str(payload).ok()?;
        if claims.exp < now {
            return None;
        }
        Some(claims)
    }
}

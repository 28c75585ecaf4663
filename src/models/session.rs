//! # 결정 세션 모델 정의
//!
//! 사용자의 결정 하나하나를 "세션"으로 저장합니다.
//! 세션은 사용자가 마법사 단계를 지날 때마다 조금씩 채워지는
//! JSON 페이로드(결정 내용, 카테고리, 세 가지 성찰 답변, 동전 결과, 반응, 통찰, 점수)를 가집니다.
//!
//! ## 페이로드 버전 관리
//! - DB에는 `payload_json` TEXT 컬럼 하나로 저장됩니다.
//! - 읽고 쓸 때는 `SessionPayload`라는 타입이 있는 구조체를 거칩니다.
//! - `version` 필드가 없는 옛 페이로드는 버전 0으로 보고, 키 이름이 같으므로
//!   버전 번호만 현재 값으로 올립니다 (`SessionPayload::from_value`).
//! - 알지 못하는 키는 `extra`에 그대로 보존됩니다.

use crate::models::ritual::{Phase, Reaction, TossResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 서버가 이해하는 최신 페이로드 버전
pub const CURRENT_PAYLOAD_VERSION: u32 = 1;

/// 세션 엔티티: DB의 `sessions` 테이블 한 행에 대응합니다.
///
/// `sqlx::FromRow`: SELECT 결과 행을 이 구조체로 자동 변환합니다.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    /// 세션 고유 식별자 (UUIDv7)
    pub id: String,
    /// 소유자 ID (외래키)
    pub user_id: String,
    /// 페이로드 원문 (JSON 문자열)
    pub payload_json: String,
    /// 생성 시각 (ISO 8601, 밀리초 단위)
    pub created_at: String,
    /// 마지막 수정 시각: 항상 created_at 이상
    pub updated_at: String,
    /// 소프트 삭제 시각: None이면 살아 있는 세션
    pub deleted_at: Option<String>,
}

/// API로 내보내는 세션 표현
///
/// DB 행과 달리 `payload`가 문자열이 아닌 JSON 객체입니다.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub payload: Value,
}

impl TryFrom<Session> for SessionResponse {
    type Error = PayloadError;

    fn try_from(session: Session) -> Result<Self, Self::Error> {
        // 조회 쿼리가 이미 `deleted_at IS NULL`로 거르므로 삭제된 행은 여기까지 오지 않습니다.
        debug_assert!(session.deleted_at.is_none(), "deleted session {} exposed", session.id);
        let payload = SessionPayload::from_json_str(&session.payload_json)?;
        Ok(Self {
            id: session.id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            payload: payload.to_value()?,
        })
    }
}

/// 페이로드 해석 실패
#[derive(Debug, Error)]
pub enum PayloadError {
    /// 최상위 값이 JSON 객체가 아님
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// 알려진 키의 타입이 맞지 않거나 JSON이 깨짐
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// 서버보다 새로운 버전의 페이로드
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u32),
}

/// 타입이 지정된 세션 페이로드
///
/// 키 이름은 웹 클라이언트가 쓰는 이름(`q-regret`, `tossResult` 등)을 그대로 따릅니다.
/// `skip_serializing_if = "Option::is_none"`: 값이 없는 필드는 JSON에서 아예 빠집니다.
/// `#[serde(flatten)] extra`: 위에 선언되지 않은 나머지 키를 모두 여기에 모읍니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(
        rename = "categoryOther",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub category_other: Option<String>,

    /// "이 선택을 하지 않으면 후회할까?"에 대한 답
    #[serde(rename = "q-regret", default, skip_serializing_if = "Option::is_none")]
    pub q_regret: Option<String>,

    /// "무엇이 두려운가?"에 대한 답
    #[serde(rename = "q-fear", default, skip_serializing_if = "Option::is_none")]
    pub q_fear: Option<String>,

    /// "1년 뒤의 나는?"에 대한 답
    #[serde(rename = "q-future", default, skip_serializing_if = "Option::is_none")]
    pub q_future: Option<String>,

    #[serde(rename = "tossResult", default, skip_serializing_if = "Option::is_none")]
    pub toss_result: Option<TossResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionPayload {
    /// JSON 값을 해석하고 최신 버전으로 올립니다.
    ///
    /// ## 에러
    /// - 객체가 아니면 `NotAnObject`
    /// - 알려진 키의 타입이 틀리면 `Malformed`
    /// - 버전이 서버보다 높으면 `UnsupportedVersion`
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        if !value.is_object() {
            return Err(PayloadError::NotAnObject);
        }
        let mut payload: SessionPayload = serde_json::from_value(value)?;
        if payload.version > CURRENT_PAYLOAD_VERSION {
            return Err(PayloadError::UnsupportedVersion(payload.version));
        }
        // 버전 0 → 1: 키 이름이 같으므로 번호만 올리면 됩니다.
        payload.version = CURRENT_PAYLOAD_VERSION;
        Ok(payload)
    }

    /// DB에 저장된 문자열에서 페이로드를 읽습니다.
    pub fn from_json_str(raw: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, PayloadError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_string(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 공백이 아닌 결정 문장이 있는지
    pub fn has_decision(&self) -> bool {
        non_empty(&self.decision).is_some()
    }

    /// 패턴 분석에 쓸 하이라이트 한 건을 뽑습니다.
    ///
    /// 결정 문장과 통찰이 모두 비어 있으면 분석할 거리가 없으므로 None.
    pub fn highlight(&self) -> Option<Highlight> {
        let decision = non_empty(&self.decision).unwrap_or_default().to_string();
        let insight = non_empty(&self.insight).unwrap_or_default().to_string();
        if decision.is_empty() && insight.is_empty() {
            return None;
        }

        // "others"이고 사용자가 직접 적은 카테고리가 있으면 "others (직접 입력)" 형태로 보여줍니다.
        let category = match (self.category.as_deref(), non_empty(&self.category_other)) {
            (Some("others"), Some(other)) => format!("others ({other})"),
            (Some(category), _) => category.to_string(),
            (None, _) => String::new(),
        };

        Some(Highlight {
            category,
            decision,
            reaction: self
                .reaction
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
            insight,
        })
    }

    /// 성찰 질문 생성에 넘길 문맥 문자열
    ///
    /// 결정, 세 가지 답변, 동전 결과, 반응을 순서대로 줄바꿈으로 잇고 빈 항목은 건너뜁니다.
    pub fn reflection_context(&self) -> String {
        let parts = [
            non_empty(&self.decision),
            non_empty(&self.q_regret),
            non_empty(&self.q_fear),
            non_empty(&self.q_future),
            self.toss_result.map(TossResult::as_str),
            self.reaction.map(Reaction::as_str),
        ];
        parts.into_iter().flatten().collect::<Vec<_>>().join("\n")
    }
}

/// `Option<String>`에서 공백이 아닌 문자열만 빌려옵니다.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// 두 페이로드 객체를 얕게(shallow) 합칩니다.
///
/// 결과는 이전 키와 새 키의 합집합이며, 같은 키는 `update` 쪽 값이 이깁니다.
/// 동시 편집 감지는 하지 않습니다 (last-write-wins).
pub fn merge_payload(prior: Map<String, Value>, update: Map<String, Value>) -> Map<String, Value> {
    let mut merged = prior;
    // extend: 같은 키가 있으면 덮어쓰고, 없으면 추가합니다.
    merged.extend(update);
    merged
}

/// 과거 세션 하나를 요약한 하이라이트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub category: String,
    pub decision: String,
    pub reaction: String,
    pub insight: String,
}

/// 세션 생성 요청: `POST /api/sessions`
///
/// `payload`가 없으면 빈 객체로 시작합니다.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub payload: Option<Value>,
}

/// 세션 수정 요청: `PUT /api/sessions/{id}`
#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub payload: Value,
}

/// 세션 목록 조회 쿼리: `GET /api/sessions?since=...`
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    /// 이 시각 이후에 수정된 세션만 (RFC 3339)
    pub since: Option<String>,
}

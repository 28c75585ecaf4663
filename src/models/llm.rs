//! # LLM 기반 API 모델
//!
//! `/api/llm/*` 엔드포인트의 요청/응답 구조체입니다.
//!
//! 요청 본문은 관대하게(lenient) 해석합니다: JSON이 깨졌거나 필드 타입이 틀리면
//! 모든 필드가 비어 있는 `Default` 값으로 취급합니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 결정 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Career,
    Relationship,
    Others,
}

impl Category {
    /// LLM이 돌려준 임의의 값을 세 카테고리 중 하나로 맞춥니다.
    ///
    /// 문자열이 아니거나 알 수 없는 값이면 `Others`.
    pub fn normalize(value: Option<&Value>) -> Category {
        match value.and_then(Value::as_str).map(str::to_lowercase).as_deref() {
            Some("career") => Category::Career,
            Some("relationship") => Category::Relationship,
            _ => Category::Others,
        }
    }
}

/// `POST /api/llm/category`
#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub category: Category,
    pub reason: String,
}

/// `POST /api/llm/reflect`
///
/// `context`가 비어 있고 `sessionId`가 있으면 저장된 세션 페이로드로 문맥을 만듭니다.
#[derive(Debug, Default, Deserialize)]
pub struct ReflectRequest {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReflectResponse {
    pub questions: Vec<String>,
    pub summary: String,
    #[serde(rename = "patternHint")]
    pub pattern_hint: String,
    pub remaining: i64,
}

/// `POST /api/llm/highlights`
#[derive(Debug, Default, Deserialize)]
pub struct HighlightsRequest {
    #[serde(rename = "currentSessionId", default)]
    pub current_session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HighlightsResponse {
    pub pattern: String,
    pub guidance: String,
    #[serde(rename = "nextAction")]
    pub next_action: String,
    pub remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_normalization() {
        assert_eq!(Category::normalize(Some(&json!("Career"))), Category::Career);
        assert_eq!(
            Category::normalize(Some(&json!("relationship"))),
            Category::Relationship
        );
        assert_eq!(Category::normalize(Some(&json!("health"))), Category::Others);
        assert_eq!(Category::normalize(Some(&json!(3))), Category::Others);
        assert_eq!(Category::normalize(None), Category::Others);
    }
}

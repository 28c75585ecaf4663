//! # 의식(Ritual) 마법사 모델
//!
//! 사용자가 결정을 내려가는 단계(phase)와, 그 과정에서 기록되는
//! 동전 던지기 결과 / 감정 반응 타입을 정의합니다.
//!
//! ## 단계 순서
//! ```text
//! intention → category → reflection → ritual → toss → result → analysis
//! ```
//! 각 단계는 "뒤로" 버튼으로 다시 들어갈 수 있습니다.
//! 실제 전이 규칙은 `services::ritual`에 있습니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 마법사의 단계
///
/// `#[serde(rename_all = "lowercase")]`: JSON에서는 `"intention"`, `"toss"`처럼 소문자로 주고받습니다.
/// `PartialOrd`/`Ord` derive: 선언 순서가 곧 진행 순서이므로 `<`, `>` 비교가 가능합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Intention,
    Category,
    Reflection,
    Ritual,
    Toss,
    Result,
    Analysis,
}

impl Phase {
    /// 진행 순서대로 나열한 전체 단계
    pub const ALL: [Phase; 7] = [
        Phase::Intention,
        Phase::Category,
        Phase::Reflection,
        Phase::Ritual,
        Phase::Toss,
        Phase::Result,
        Phase::Analysis,
    ];

    /// 0부터 시작하는 순서 번호
    pub fn index(self) -> usize {
        // `as usize`: 필드 없는 enum은 선언 순서대로 0, 1, 2...의 판별값을 가집니다.
        self as usize
    }

    /// 다음 단계. 마지막 단계(analysis)에서는 None
    pub fn next(self) -> Option<Phase> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// 이전 단계. 첫 단계(intention)에서는 None
    pub fn prev(self) -> Option<Phase> {
        // checked_sub: 0에서 1을 빼면 None (usize 언더플로 방지)
        self.index().checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Intention => "intention",
            Phase::Category => "category",
            Phase::Reflection => "reflection",
            Phase::Ritual => "ritual",
            Phase::Toss => "toss",
            Phase::Result => "result",
            Phase::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 동전 던지기 결과: JSON에서는 `"YES"` / `"NO"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TossResult {
    Yes,
    No,
}

impl TossResult {
    pub fn as_str(self) -> &'static str {
        match self {
            TossResult::Yes => "YES",
            TossResult::No => "NO",
        }
    }
}

impl fmt::Display for TossResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 동전 결과를 본 직후의 감정 반응
///
/// JSON 값은 변형 이름 그대로입니다: `"Nothing"`, `"Relieved"`, `"Anxious"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reaction {
    Nothing,
    Relieved,
    Anxious,
}

impl Reaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Nothing => "Nothing",
            Reaction::Relieved => "Relieved",
            Reaction::Anxious => "Anxious",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `POST /api/sessions/{id}/phase` 요청 본문
#[derive(Debug, Deserialize)]
pub struct MovePhaseRequest {
    pub phase: Phase,
}

/// `POST /api/sessions/{id}/reaction` 요청 본문
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub reaction: Reaction,
}

/// `POST /api/sessions/{id}/toss` 응답
///
/// `reveal_after_ms`: 클라이언트가 동전 애니메이션을 보여준 뒤 결과를 공개할 때까지의 지연
#[derive(Debug, Serialize)]
pub struct TossResponse {
    #[serde(rename = "tossResult")]
    pub toss_result: TossResult,
    pub phase: Phase,
    #[serde(rename = "revealAfterMs")]
    pub reveal_after_ms: u64,
}

/// `POST /api/sessions/{id}/reaction` 응답
#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub reaction: Reaction,
    pub insight: String,
    pub score: i64,
    pub phase: Phase,
}

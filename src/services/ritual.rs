//! # 의식(Ritual) 마법사 상태 기계
//!
//! 결정 세션을 `intention → category → reflection → ritual → toss → result → analysis`
//! 순서로 진행시키는 규칙을 담습니다. 모든 함수는 `SessionPayload`만 다루고
//! DB에는 접근하지 않으므로, 라우트 핸들러가 읽기 → 전이 → 저장 순서로 호출합니다.
//!
//! ## 전이 규칙
//! - 현재 단계, 바로 다음 단계, 바로 이전 단계로만 이동할 수 있습니다.
//! - intention을 앞으로 벗어나려면 결정 문장이 있어야 합니다.
//! - result에 들어가려면 동전 결과가, analysis에 들어가려면 감정 반응이 있어야 합니다.
//! - 동전은 toss 단계에서만, 반응은 result 단계에서만 기록할 수 있습니다.

use crate::models::{Phase, Reaction, SessionPayload, TossResult};
use rand::Rng;
use thiserror::Error;

/// 동전 애니메이션이 끝나고 결과를 공개하기까지의 지연(ms)
pub const TOSS_REVEAL_DELAY_MS: u64 = 1800;

/// 전이 규칙 위반
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RitualError {
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("a decision is required before leaving the intention phase")]
    MissingDecision,

    #[error("the coin has not been tossed yet")]
    NotTossed,

    #[error("no reaction has been recorded yet")]
    NoReaction,

    #[error("this action is only available in the {expected} phase (currently {actual})")]
    WrongPhase { expected: Phase, actual: Phase },
}

/// 페이로드의 현재 단계
///
/// 저장된 `phase`가 있으면 그대로 쓰고, 없으면(옛 페이로드) 채워진 내용으로 추정합니다:
/// 결정이 없으면 intention, 카테고리가 없으면 category, 그 외에는 reflection.
pub fn current_phase(payload: &SessionPayload) -> Phase {
    if let Some(phase) = payload.phase {
        return phase;
    }
    if !payload.has_decision() {
        Phase::Intention
    } else if payload.category.is_none() {
        Phase::Category
    } else {
        Phase::Reflection
    }
}

/// 사용자가 누른 "다음"/"뒤로" 버튼에 따라 단계를 옮깁니다.
pub fn move_to(payload: &mut SessionPayload, to: Phase) -> Result<Phase, RitualError> {
    let from = current_phase(payload);

    let adjacent = to == from || from.next() == Some(to) || from.prev() == Some(to);
    if !adjacent {
        return Err(RitualError::InvalidTransition { from, to });
    }

    // 뒤로 가는 이동은 언제나 허용되고, 앞으로 가는 이동만 조건을 봅니다.
    if to > from {
        if from == Phase::Intention && !payload.has_decision() {
            return Err(RitualError::MissingDecision);
        }
        if to == Phase::Result && payload.toss_result.is_none() {
            return Err(RitualError::NotTossed);
        }
        if to == Phase::Analysis && payload.reaction.is_none() {
            return Err(RitualError::NoReaction);
        }
    }

    payload.phase = Some(to);
    Ok(to)
}

/// 동전을 던져 결과를 기록하고 result 단계로 넘어갑니다.
///
/// 균등한 무작위 불리언일 뿐 암호학적 의미는 없습니다.
/// `R: Rng + ?Sized`: 테스트에서는 시드를 고정한 난수 생성기를 넘길 수 있습니다.
pub fn toss<R: Rng + ?Sized>(
    payload: &mut SessionPayload,
    rng: &mut R,
) -> Result<TossResult, RitualError> {
    let actual = current_phase(payload);
    if actual != Phase::Toss {
        return Err(RitualError::WrongPhase {
            expected: Phase::Toss,
            actual,
        });
    }

    let result = if rng.gen_bool(0.5) {
        TossResult::Yes
    } else {
        TossResult::No
    };
    payload.toss_result = Some(result);
    payload.phase = Some(Phase::Result);
    Ok(result)
}

/// 감정 반응을 통찰 문장과 점수로 바꾸는 고정 표
pub fn insight_for(reaction: Reaction, toss: TossResult) -> (String, i64) {
    match reaction {
        Reaction::Nothing => (
            "You feel no spark of reaction to this result. This numbness suggests the question you asked is not the real question at hand."
                .to_string(),
            15,
        ),
        Reaction::Relieved => (
            format!(
                "The coin said {toss}, and your soul exhaled. This relief is the clearest signal. Your subconscious was already leaning toward this outcome."
            ),
            95,
        ),
        Reaction::Anxious => (
            format!(
                "The coin landed on {toss}, and your immediate reaction was dread or anxiety. If a \"Yes\" makes you anxious, your answer is \"No\"."
            ),
            80,
        ),
    }
}

/// 감정 반응을 기록하고 통찰/점수를 채운 뒤 analysis 단계로 넘어갑니다.
pub fn react(
    payload: &mut SessionPayload,
    reaction: Reaction,
) -> Result<(String, i64), RitualError> {
    let actual = current_phase(payload);
    if actual != Phase::Result {
        return Err(RitualError::WrongPhase {
            expected: Phase::Result,
            actual,
        });
    }
    let toss = payload.toss_result.ok_or(RitualError::NotTossed)?;

    let (insight, score) = insight_for(reaction, toss);
    payload.reaction = Some(reaction);
    payload.insight = Some(insight.clone());
    payload.score = Some(score);
    payload.phase = Some(Phase::Analysis);
    Ok((insight, score))
}

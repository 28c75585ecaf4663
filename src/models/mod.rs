//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! 각 하위 모듈은 특정 도메인의 데이터 타입을 담당합니다:
//! - `llm`: LLM 기반 API(분류, 성찰 질문, 하이라이트 분석)의 요청/응답
//! - `ritual`: 의식(ritual) 마법사의 단계, 동전 결과, 감정 반응
//! - `session`: 결정 세션과 타입이 지정된 페이로드
//! - `user`: 사용자(User)와 인증 요청/응답
//!
//! `llm`, `ritual`, `session`은 `pub use X::*;`로 재공개하므로 `crate::models::Session`처럼 짧게 쓸 수 있습니다.
//! 인증 쪽 타입은 쓰는 곳이 적어 `models::user::User`처럼 경로를 밝혀 씁니다.

pub mod llm;
pub mod ritual;
pub mod session;
pub mod user;

pub use llm::*;
pub use ritual::*;
pub use session::*;

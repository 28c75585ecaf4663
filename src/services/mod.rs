//! # 서비스(비즈니스 로직) 모듈
//!
//! HTTP나 SQL에 직접 묶이지 않는 도메인 로직을 모아둔 모듈입니다.
//!
//! 각 하위 모듈:
//! - `llm`: chat completions API 호출 (분류, 성찰 질문, 하이라이트 분석)
//! - `password`: Argon2id 비밀번호 해싱/검증
//! - `quota`: 사용자별 LLM 호출 쿼터
//! - `ratelimit`: 외부 Redis 기반 슬라이딩 윈도우 레이트 리미터
//! - `ritual`: 결정 마법사의 단계 전이, 동전 던지기, 감정 반응 표
//! - `token`: 세션 쿠키용 HMAC 서명 토큰

pub mod llm;
pub mod password;
pub mod quota;
pub mod ratelimit;
pub mod ritual;
pub mod token;

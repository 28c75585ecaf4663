//! # 요청 전처리(미들웨어/추출기) 모듈
//!
//! - `auth`: 세션 쿠키에서 사용자를 알아내는 추출기(`CurrentUser`, `AuthUser`)와
//!   게스트 계정 자동 생성, 쿠키 발급/삭제

pub mod auth;

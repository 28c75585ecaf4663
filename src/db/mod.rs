//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 라우트 핸들러(routes/)에서 이 모듈의 함수를 호출하여 DB 작업을 수행합니다.
//!
//! 각 하위 모듈:
//! - `sessions`: 결정 세션 CRUD (소프트 삭제 포함)
//! - `usage`: LLM 사용 기록(usage ledger) 추가/집계
//! - `users`: 사용자(게스트 포함) 생성과 자격 증명
//!
//! 연결 풀은 전역 변수가 아니라 `connect()`로 명시적으로 만들어
//! `AppState`로 주입하고, 서버 종료 시 `pool.close()`로 정리합니다.

pub mod sessions;
pub mod usage;
pub mod users;

pub use sessions::*;
pub use usage::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// 연결 풀을 만들고 마이그레이션을 적용합니다.
///
/// - `create_if_missing(true)`: DB 파일이 없으면 새로 만듭니다.
/// - `foreign_keys(true)`: SQLite는 기본적으로 외래키 검사를 끄므로 명시적으로 켭니다.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5) // 최대 5개의 동시 연결
        .connect_with(options)
        .await?;

    // sqlx::migrate!: 컴파일 타임에 ./migrations 폴더의 SQL 파일들을 바이너리에 포함시킵니다.
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// 테스트용 인메모리 DB
///
/// `:memory:` DB는 연결마다 따로 생기므로 연결을 1개로 고정하고,
/// 유휴 연결이 닫혀 데이터가 사라지지 않도록 수명 제한을 끕니다.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("failed to open in-memory db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

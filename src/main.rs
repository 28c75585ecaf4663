//! # Kettei 웹 서버 진입점
//!
//! 이 파일은 Kettei 애플리케이션의 **시작점(entry point)**입니다.
//! Kettei는 "동전을 던졌을 때 마음이 어떻게 반응하는지"로 결정을 돕는 성찰 도구입니다.
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. 설정 검증 (필수 값이 없으면 여기서 종료)
//! 4. SQLite 연결 풀 생성 + 마이그레이션
//! 5. 공유 상태(AppState)와 API 라우터 조립
//! 6. 프론트엔드 정적 파일 서빙 (빌드가 있을 때만)
//! 7. HTTP 서버 시작, 종료 신호를 받으면 진행 중인 요청을 마치고 연결 풀 정리

// ── 모듈 선언 ──
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use anyhow::Result; // anyhow::Result: 어떤 에러 타입이든 담을 수 있는 범용 Result 타입
use config::Config;
use routes::AppState;
use std::{path::Path, time::Duration};
use tower_http::services::{ServeDir, ServeFile}; // 정적 파일 서빙 서비스
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt}; // 로깅 초기화 유틸리티

/// 외부 HTTP 호출(LLM, 레이트 리미터)의 전체 타임아웃
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 에러 없이 넘어갑니다 (운영 환경에서는 실제 환경변수를 씀).
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅(tracing) 초기화 ──
    // RUST_LOG가 없으면 kettei, tower_http, axum 모듈을 debug 레벨로 봅니다.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kettei=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    // 필수 키가 비었거나 "..."(예시 값 그대로)면 서버를 띄우지 않고 바로 종료합니다.
    let config = Config::from_env()?;
    tracing::info!("Starting Kettei server on {}:{}", config.host, config.port);

    // ── 4단계: 연결 풀 생성 + 마이그레이션 ──
    // 풀은 전역 변수가 아니라 여기서 한 번 만들어 AppState로 주입합니다.
    let pool = db::connect(&config.database_url).await?;

    // ── 5단계: 공유 상태와 라우터 ──
    // reqwest::Client는 내부에 연결 풀을 가지므로 하나만 만들어 LLM과 리미터가 함께 씁니다.
    let client = reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .build()?;
    let state = AppState::from_config(&config, pool.clone(), client);
    let api = routes::build_router(state);

    // ── 6단계: 프론트엔드 정적 파일 서빙 ──
    // SPA이므로 찾을 수 없는 경로는 index.html로 돌려보냅니다.
    let frontend_dist = Path::new(&config.frontend_dist);
    let app = if frontend_dist.exists() {
        tracing::info!("Serving frontend static files from {}", config.frontend_dist);
        let serve_dir = ServeDir::new(frontend_dist)
            .not_found_service(ServeFile::new(frontend_dist.join("index.html")));
        api.fallback_service(serve_dir)
    } else {
        tracing::warn!("Frontend dist directory not found, serving API only");
        api
    };

    // ── 7단계: 서버 시작 ──
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // with_graceful_shutdown: 종료 신호가 오면 새 연결을 받지 않고,
    // 처리 중인 요청이 끝날 때까지 기다린 뒤 serve()가 반환됩니다.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 요청이 모두 끝났으므로 DB 연결을 정리합니다.
    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Ctrl+C(SIGINT) 또는 SIGTERM(컨테이너 종료)을 기다립니다.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // SIGTERM은 유닉스에만 있으므로 다른 플랫폼에서는 영원히 기다리는 future로 대신합니다.
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    // tokio::select!: 둘 중 먼저 끝나는 쪽을 기다립니다.
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}

//! 게임 서버 (Cluster)
//!
//! Hall 서버들의 링크를 받아 uid 별 사용자 액터로 메시지를 분배합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

mod config;
mod protocol;

use cluster::ClusterGate;
use config::{validate_config, GameServerConfig};
use protocol::GameProcessor;
use shared::config::ENV_PATHS;
use shared::logging::{init_logging, log_env_file, LoggingConfig, ServiceType};

/// 게임 서버 메인 진입점
///
/// 환경변수:
/// - game_host / game_port: Hall 링크 리스너 (기본값: "127.0.0.1:5000")
/// - game_server_type / game_server_id: 이 서버의 식별자 (로그용)
/// - game_mailbox_capacity: 사용자 액터 메일박스 용량
/// - game_retain_secs / game_sweep_secs: 유휴 액터 보관 시간과 정리 주기
#[tokio::main]
async fn main() -> Result<()> {
    let (logging, env_path) = LoggingConfig::from_env_file(&ENV_PATHS);
    init_logging(ServiceType::GameServer, &logging)?;
    log_env_file(env_path);

    let config = GameServerConfig::from_env()?;

    validate_config(&config)?;

    info!("=== 게임 서버 설정 ===");
    info!("Hall 링크 리스너: {}", config.bind_address());
    info!(
        "서버 타입: {}, 서버 ID: {}",
        config.server_type, config.server_id
    );
    info!(
        "액터 보관 시간: {:?}, 정리 주기: {:?}",
        config.retain_time, config.sweep_interval
    );
    info!("======================");

    let gate = ClusterGate::new(config.gate_config(), Arc::new(GameProcessor::new()));
    let addr = gate.start().await.context("Cluster 게이트 시작 실패")?;
    info!("🎮 게임 서버 시작 완료: {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");
    info!("활성 사용자 액터: {}", gate.actor_count());

    gate.close().await;
    info!("✅ 게임 서버가 성공적으로 중지되었습니다");
    Ok(())
}

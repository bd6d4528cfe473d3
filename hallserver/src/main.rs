//! Hall 서버
//!
//! 사용자 TCP 연결을 받아 타입 0 메시지는 직접 처리하고,
//! 나머지는 서버 타입별 백엔드 풀로 전달합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

mod config;
mod protocol;

use cluster::{
    BackendPool, HallGate, HallHooks, HallSession, ServerId, ServerType, StrictPolicy, Uid,
};
use config::{validate_config, HallServerConfig};
use protocol::{HallProcessor, PlayerInfo};
use shared::config::ENV_PATHS;
use shared::logging::{init_logging, log_env_file, LoggingConfig, ServiceType};

type Session = HallSession<HallProcessor>;

fn on_heartbeat(uid: &Uid, session: &Arc<Session>) {
    if session.is_closed() {
        warn!("닫힌 세션이 레지스트리에 남아 있습니다 [uid: {}]", uid);
    }
}

fn on_agent_closed(uid: Uid, session: &Arc<Session>) {
    let nickname = session
        .user_data::<PlayerInfo>()
        .map(|info| info.nickname.clone())
        .unwrap_or_default();
    info!("사용자 퇴장 [uid: {}, 닉네임: {}]", uid, nickname);
}

fn on_backend_link_closed(uid: Uid, server_type: ServerType, server_id: ServerId) {
    warn!(
        "사용자의 백엔드 연결이 끊어졌습니다 [uid: {}, 서버 타입: {}, 서버 ID: {}]",
        uid, server_type, server_id
    );
}

fn on_gate_started(gate: &Arc<HallGate<HallProcessor>>) {
    info!("Hall 게이트 준비 완료 (최대 접속 {})", gate.config().max_conn_num);
}

/// 게이트 훅 구성
fn hooks() -> HallHooks<HallProcessor> {
    HallHooks {
        heartbeat: Some(Arc::new(on_heartbeat)),
        agent_closed: Some(Arc::new(on_agent_closed)),
        backend_link_closed: Some(Arc::new(on_backend_link_closed)),
        custom: Some(Arc::new(on_gate_started)),
    }
}

/// Hall 서버 메인 진입점
///
/// 환경 설정은 Backend/.env 파일에서 로드됩니다.
///
/// 환경변수:
/// - hall_host / hall_port: 사용자 리스너 (기본값: "127.0.0.1:4000")
/// - hall_backends: 백엔드 목록 `타입:ID=주소,...` (기본값: "1:0=127.0.0.1:5000")
/// - hall_strict_policies: 고정 정책 `타입=ID|ID,...` (기본값: 없음)
/// - hall_heartbeat_secs, hall_read_timeout_secs: 0 이면 비활성
#[tokio::main]
async fn main() -> Result<()> {
    // .env 로드 후 로깅을 먼저 초기화해야 설정 로드 로그가 남음
    let (logging, env_path) = LoggingConfig::from_env_file(&ENV_PATHS);
    init_logging(ServiceType::HallServer, &logging)?;
    log_env_file(env_path);

    // 환경 설정 로드
    let config = HallServerConfig::from_env()?;

    // 설정 검증
    validate_config(&config)?;

    info!("=== Hall 서버 설정 ===");
    info!("사용자 리스너: {}", config.bind_address());
    for backend in &config.backends {
        info!(
            "백엔드 [서버 타입: {}, 서버 ID: {}] {}",
            backend.server_type, backend.server_id, backend.addr
        );
    }
    info!("======================");

    // 백엔드 풀
    let pool = BackendPool::new(config.dialer_defaults());
    pool.set_link_closed_hook(Arc::new(|server_type: ServerType, server_id: ServerId| {
        warn!(
            "백엔드 링크 종료 [서버 타입: {}, 서버 ID: {}]",
            server_type, server_id
        );
    }));
    for backend in &config.backends {
        pool.add_server(backend.addr.clone(), backend.server_type, backend.server_id)
            .with_context(|| format!("백엔드 추가 실패: {:?}", backend))?;
    }

    // Hall 게이트
    let mut gate = HallGate::new(
        config.gate_config(),
        Arc::new(HallProcessor::new()),
        pool.registry(),
    )
    .with_hooks(hooks());
    for policy in &config.strict_policies {
        gate = gate.with_default_policy(
            policy.server_type,
            Arc::new(StrictPolicy::new(
                policy.server_type,
                policy.server_ids.iter().copied(),
            )),
        );
    }
    let gate = Arc::new(gate);
    gate.start().await.context("Hall 게이트 시작 실패")?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    if let Some(stats) = gate.heartbeat_stats() {
        info!("하트비트 통계: {}", serde_json::to_string(&stats)?);
    }

    gate.close().await;
    pool.close().await;
    info!("✅ Hall 서버가 성공적으로 중지되었습니다");
    Ok(())
}

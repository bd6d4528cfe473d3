//! 게임 서버 환경 설정 모듈
//!
//! Backend/.env 파일에서 환경변수를 로드하고 관리합니다.

use anyhow::Result;
use std::time::Duration;
use tracing::info;

use cluster::{ClusterGateConfig, ServerId, ServerType};
use shared::config::{env_or, env_string};

/// 게임 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct GameServerConfig {
    /// Hall 연결을 받는 호스트
    pub host: String,
    /// Hall 연결을 받는 포트
    pub port: u16,
    /// 이 서버의 서버 타입 (로그용)
    pub server_type: ServerType,
    /// 이 서버의 서버 ID (로그용)
    pub server_id: ServerId,
    /// 최대 동시 Hall 연결 수
    pub max_conn_num: usize,
    /// Hall 연결별 송신 대기 큐 용량
    pub pending_write_num: usize,
    /// 사용자 액터 메일박스 용량
    pub mailbox_capacity: usize,
    /// 유휴 사용자 액터 보관 시간
    pub retain_time: Duration,
    /// 유휴 사용자 액터 정리 주기
    pub sweep_interval: Duration,
}

impl GameServerConfig {
    /// 환경변수에서 설정을 로드합니다. `.env`는 호출 전에 로드돼 있어야 합니다.
    pub fn from_env() -> Result<Self> {
        let defaults = ClusterGateConfig::default();
        let config = Self {
            host: env_string("game_host", "127.0.0.1"),
            port: env_or("game_port", 5000),
            server_type: env_or("game_server_type", 1),
            server_id: env_or("game_server_id", 0),
            max_conn_num: env_or("game_max_conn_num", defaults.max_conn_num),
            pending_write_num: env_or("game_pending_write_num", defaults.pending_write_num),
            mailbox_capacity: env_or("game_mailbox_capacity", defaults.mailbox_capacity),
            retain_time: Duration::from_secs(env_or(
                "game_retain_secs",
                defaults.retain_time.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_or(
                "game_sweep_secs",
                defaults.sweep_interval.as_secs(),
            )),
        };

        info!("게임 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Cluster 게이트 설정
    pub fn gate_config(&self) -> ClusterGateConfig {
        ClusterGateConfig {
            tcp_addr: self.bind_address(),
            max_conn_num: self.max_conn_num,
            pending_write_num: self.pending_write_num,
            mailbox_capacity: self.mailbox_capacity,
            retain_time: self.retain_time,
            sweep_interval: self.sweep_interval,
            ..ClusterGateConfig::default()
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &GameServerConfig) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 게임 서버 포트 번호: {}", config.port);
    }

    if config.host.is_empty() {
        anyhow::bail!("게임 서버 호스트 주소가 비어있습니다");
    }

    if config.server_type == cluster::protocol::LOCAL_SERVER_TYPE {
        anyhow::bail!("서버 타입 0 은 Hall 로컬 처리용입니다");
    }

    if config.sweep_interval.is_zero() || config.retain_time.is_zero() {
        anyhow::bail!("액터 정리 주기와 보관 시간은 0 일 수 없습니다");
    }

    config.gate_config().validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameServerConfig {
        GameServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            server_type: 1,
            server_id: 0,
            max_conn_num: 10,
            pending_write_num: 100,
            mailbox_capacity: 100,
            retain_time: Duration::from_secs(12 * 3600),
            sweep_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&config()).is_ok());

        let mut local = config();
        local.server_type = 0;
        assert!(validate_config(&local).is_err());

        let mut no_sweep = config();
        no_sweep.sweep_interval = Duration::ZERO;
        assert!(validate_config(&no_sweep).is_err());

        let mut no_mailbox = config();
        no_mailbox.mailbox_capacity = 0;
        assert!(validate_config(&no_mailbox).is_err());
    }

    #[test]
    fn test_gate_config() {
        let gate = config().gate_config();
        assert_eq!(gate.tcp_addr, "127.0.0.1:5000");
        assert_eq!(gate.retain_time, Duration::from_secs(12 * 3600));
    }
}

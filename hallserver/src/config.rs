//! Hall 서버 환경 설정 모듈
//!
//! Backend/.env 파일에서 환경변수를 로드하고 관리합니다.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use cluster::{DialerConfig, FrameConfig, HallGateConfig, ServerId, ServerType};
use shared::config::{env_bool, env_or, env_secs, env_string};

/// 연결할 백엔드 서버 한 대
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEntry {
    pub server_type: ServerType,
    pub server_id: ServerId,
    pub addr: String,
}

/// 서버 타입을 특정 서버 ID 들로 고정하는 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictEntry {
    pub server_type: ServerType,
    pub server_ids: Vec<ServerId>,
}

/// Hall 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct HallServerConfig {
    /// 사용자 TCP 리스너 호스트
    pub host: String,
    /// 사용자 TCP 리스너 포트
    pub port: u16,
    /// 최대 동시 접속 수
    pub max_conn_num: usize,
    /// 클라이언트 연결별 송신 대기 큐 용량
    pub client_pending_write_num: usize,
    /// 클라이언트 유휴 읽기 제한 시간
    pub read_timeout: Option<Duration>,
    /// 하트비트 순회 주기
    pub heartbeat_interval: Option<Duration>,
    /// 백엔드별 연결 수
    pub backend_conn_num: usize,
    /// 백엔드 재연결 간격
    pub connect_interval: Duration,
    /// 백엔드 링크 송신 큐 용량
    pub backend_pending_write_num: usize,
    /// 백엔드 자동 재연결 여부
    pub auto_reconnect: bool,
    /// 연결할 백엔드 목록
    pub backends: Vec<BackendEntry>,
    /// 고정 선택 정책 목록
    pub strict_policies: Vec<StrictEntry>,
}

impl HallServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 값은 시스템 환경변수(시작 시 로드한 .env 포함)에서 읽고, 없으면 기본값을 씁니다.
    pub fn from_env() -> Result<Self> {
        let gate_defaults = HallGateConfig::default();
        let dialer_defaults = DialerConfig::new("");

        let config = Self {
            host: env_string("hall_host", "127.0.0.1"),
            port: env_or("hall_port", 4000),
            max_conn_num: env_or("hall_max_conn_num", gate_defaults.max_conn_num),
            client_pending_write_num: env_or(
                "hall_pending_write_num",
                gate_defaults.pending_write_num,
            ),
            read_timeout: env_secs("hall_read_timeout_secs", gate_defaults.read_timeout),
            heartbeat_interval: env_secs(
                "hall_heartbeat_secs",
                gate_defaults.heartbeat_interval,
            ),
            backend_conn_num: env_or("backend_conn_num", dialer_defaults.conn_num),
            connect_interval: Duration::from_millis(env_or(
                "backend_connect_interval_ms",
                dialer_defaults.connect_interval.as_millis() as u64,
            )),
            backend_pending_write_num: env_or(
                "backend_pending_write_num",
                dialer_defaults.pending_write_num,
            ),
            auto_reconnect: env_bool("backend_auto_reconnect", dialer_defaults.auto_reconnect),
            backends: parse_backends(&env_string("hall_backends", "1:0=127.0.0.1:5000"))
                .context("hall_backends 파싱 실패")?,
            strict_policies: parse_strict_policies(&env_string("hall_strict_policies", ""))
                .context("hall_strict_policies 파싱 실패")?,
        };

        info!("Hall 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 사용자 리스너 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hall 게이트 설정
    pub fn gate_config(&self) -> HallGateConfig {
        HallGateConfig {
            tcp_addr: self.bind_address(),
            max_conn_num: self.max_conn_num,
            pending_write_num: self.client_pending_write_num,
            frame: FrameConfig::default(),
            read_timeout: self.read_timeout,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// 모든 백엔드에 공통으로 쓰는 다이얼러 설정 (주소 제외)
    pub fn dialer_defaults(&self) -> DialerConfig {
        DialerConfig {
            conn_num: self.backend_conn_num,
            connect_interval: self.connect_interval,
            pending_write_num: self.backend_pending_write_num,
            auto_reconnect: self.auto_reconnect,
            ..DialerConfig::new("")
        }
    }
}

/// `타입:ID=주소` 항목을 쉼표로 구분한 목록을 파싱합니다.
///
/// 예: `1:0=127.0.0.1:5000,1:1=127.0.0.1:5001`
pub fn parse_backends(raw: &str) -> Result<Vec<BackendEntry>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (key, addr) = item
                .split_once('=')
                .with_context(|| format!("'=' 가 없는 백엔드 항목: {}", item))?;
            let (server_type, server_id) = key
                .split_once(':')
                .with_context(|| format!("'타입:ID' 형식이 아닌 백엔드 키: {}", key))?;
            Ok(BackendEntry {
                server_type: server_type
                    .trim()
                    .parse()
                    .with_context(|| format!("잘못된 서버 타입: {}", server_type))?,
                server_id: server_id
                    .trim()
                    .parse()
                    .with_context(|| format!("잘못된 서버 ID: {}", server_id))?,
                addr: addr.trim().to_string(),
            })
        })
        .collect()
}

/// `타입=ID|ID` 항목을 쉼표로 구분한 목록을 파싱합니다.
///
/// 예: `2=0|1` (타입 2 는 서버 0, 1 중 가장 낮은 ID 로 고정)
pub fn parse_strict_policies(raw: &str) -> Result<Vec<StrictEntry>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (server_type, ids) = item
                .split_once('=')
                .with_context(|| format!("'=' 가 없는 정책 항목: {}", item))?;
            let server_ids = ids
                .split('|')
                .map(|id| {
                    id.trim()
                        .parse()
                        .with_context(|| format!("잘못된 서버 ID: {}", id))
                })
                .collect::<Result<Vec<ServerId>>>()?;
            Ok(StrictEntry {
                server_type: server_type
                    .trim()
                    .parse()
                    .with_context(|| format!("잘못된 서버 타입: {}", server_type))?,
                server_ids,
            })
        })
        .collect()
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &HallServerConfig) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 Hall 포트 번호: {}", config.port);
    }

    if config.host.is_empty() {
        anyhow::bail!("Hall 호스트 주소가 비어있습니다");
    }

    if config.backends.is_empty() {
        anyhow::bail!("연결할 백엔드가 없습니다");
    }

    if let Some(backend) = config
        .backends
        .iter()
        .find(|backend| backend.server_type == cluster::protocol::LOCAL_SERVER_TYPE)
    {
        anyhow::bail!("서버 타입 0 은 Hall 로컬 처리용입니다: {:?}", backend);
    }

    if let Some(policy) = config.strict_policies.iter().find(|p| p.server_ids.is_empty()) {
        anyhow::bail!("서버 ID 가 없는 고정 정책: 타입 {}", policy.server_type);
    }

    config.gate_config().validate()?;
    Ok(())
}

//! 클러스터 라우팅 설정 모듈
//!
//! 프레임 파서, 백엔드 다이얼러, Hall 게이트, Cluster 게이트 설정을 정의합니다.
//! 모든 설정은 기본값을 가지며 부팅 시 `validate()`로 검증합니다.

use std::time::Duration;
use tracing::warn;

use crate::tool::error::{ClusterError, ClusterResult};

/// 백엔드 송신 큐 기본 용량
///
/// Hall 이 백엔드의 일시적인 지연을 얼마나 버틸 수 있는지를 결정합니다.
pub const DEFAULT_PENDING_WRITE_NUM: usize = 250_000;
/// 재연결 기본 간격
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_secs(3);
/// 사용자 액터 메일박스 기본 용량
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;
/// 유휴 사용자 액터 보관 시간
pub const DEFAULT_RETAIN_TIME: Duration = Duration::from_secs(12 * 60 * 60);
/// 유휴 사용자 액터 정리 주기
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 프레임 파서 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// 길이 헤더 크기 (1, 2, 4 바이트)
    pub len_msg_len: usize,
    /// 최소 본문 길이
    pub min_msg_len: u32,
    /// 최대 본문 길이 (길이 헤더 폭으로 잘림)
    pub max_msg_len: u32,
    /// 리틀 엔디언 여부
    pub little_endian: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            len_msg_len: 2,
            min_msg_len: 1,
            max_msg_len: 4096,
            little_endian: true,
        }
    }
}

impl FrameConfig {
    /// 프레임 설정 검증
    pub fn validate(&self) -> ClusterResult<()> {
        if !matches!(self.len_msg_len, 1 | 2 | 4) {
            return Err(ClusterError::config(format!(
                "길이 헤더 크기는 1, 2, 4 중 하나여야 합니다: {}",
                self.len_msg_len
            )));
        }
        if self.min_msg_len > self.max_msg_len {
            return Err(ClusterError::config(format!(
                "최소 길이({})가 최대 길이({})보다 큽니다",
                self.min_msg_len, self.max_msg_len
            )));
        }
        Ok(())
    }
}

/// 백엔드 재연결 다이얼러 설정
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// 백엔드 주소
    pub addr: String,
    /// 동시에 유지할 연결 수
    pub conn_num: usize,
    /// 다이얼 재시도 및 재연결 간격
    pub connect_interval: Duration,
    /// 링크별 송신 큐 용량
    pub pending_write_num: usize,
    /// 연결이 끊어졌을 때 다시 연결할지 여부
    pub auto_reconnect: bool,
    /// 프레임 설정
    pub frame: FrameConfig,
}

impl DialerConfig {
    /// 기본 설정으로 다이얼러 설정 생성
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn_num: 1,
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            pending_write_num: DEFAULT_PENDING_WRITE_NUM,
            auto_reconnect: true,
            frame: FrameConfig {
                max_msg_len: u32::MAX,
                ..FrameConfig::default()
            },
        }
    }

    /// 잘못된 값을 기본값으로 보정합니다.
    pub fn normalize(&mut self) {
        if self.conn_num == 0 {
            self.conn_num = 1;
            warn!("잘못된 conn_num, {}(으)로 재설정", self.conn_num);
        }
        if self.connect_interval.is_zero() {
            self.connect_interval = DEFAULT_CONNECT_INTERVAL;
            warn!(
                "잘못된 connect_interval, {:?}(으)로 재설정",
                self.connect_interval
            );
        }
        if self.pending_write_num == 0 {
            self.pending_write_num = 100;
            warn!(
                "잘못된 pending_write_num, {}(으)로 재설정",
                self.pending_write_num
            );
        }
    }

    /// 다이얼러 설정 검증
    pub fn validate(&self) -> ClusterResult<()> {
        if self.addr.is_empty() {
            return Err(ClusterError::config("백엔드 주소가 비어있습니다"));
        }
        self.frame.validate()
    }
}

/// Hall 게이트 설정
#[derive(Debug, Clone)]
pub struct HallGateConfig {
    /// 사용자 TCP 리스너 주소
    pub tcp_addr: String,
    /// 최대 동시 접속 수
    pub max_conn_num: usize,
    /// 클라이언트 연결별 송신 대기 큐 용량
    pub pending_write_num: usize,
    /// 프레임 설정
    pub frame: FrameConfig,
    /// 클라이언트 유휴 읽기 제한 시간 (없으면 무제한)
    pub read_timeout: Option<Duration>,
    /// 하트비트 순회 주기 (없으면 하트비트 비활성)
    pub heartbeat_interval: Option<Duration>,
}

impl Default for HallGateConfig {
    fn default() -> Self {
        Self {
            tcp_addr: "127.0.0.1:4000".to_string(),
            max_conn_num: 10_000,
            pending_write_num: 1_000,
            frame: FrameConfig::default(),
            read_timeout: None,
            heartbeat_interval: Some(Duration::from_secs(10)),
        }
    }
}

impl HallGateConfig {
    /// Hall 게이트 설정 검증
    pub fn validate(&self) -> ClusterResult<()> {
        if self.tcp_addr.is_empty() {
            return Err(ClusterError::config("Hall 리스너 주소가 비어있습니다"));
        }
        if self.max_conn_num == 0 {
            return Err(ClusterError::config("max_conn_num 은 0 일 수 없습니다"));
        }
        if self.pending_write_num == 0 {
            return Err(ClusterError::config("pending_write_num 은 0 일 수 없습니다"));
        }
        if matches!(self.heartbeat_interval, Some(interval) if interval.is_zero()) {
            return Err(ClusterError::config("하트비트 주기는 0 일 수 없습니다"));
        }
        self.frame.validate()
    }
}

/// Cluster 게이트 설정
#[derive(Debug, Clone)]
pub struct ClusterGateConfig {
    /// Hall 연결을 받는 TCP 리스너 주소
    pub tcp_addr: String,
    /// 최대 동시 Hall 연결 수
    pub max_conn_num: usize,
    /// Hall 연결별 송신 대기 큐 용량
    pub pending_write_num: usize,
    /// 프레임 설정
    pub frame: FrameConfig,
    /// 사용자 액터 메일박스 용량
    pub mailbox_capacity: usize,
    /// 마지막 접근 이후 사용자 액터를 보관하는 시간
    pub retain_time: Duration,
    /// 유휴 사용자 액터 정리 주기
    pub sweep_interval: Duration,
}

impl Default for ClusterGateConfig {
    fn default() -> Self {
        Self {
            tcp_addr: "127.0.0.1:5000".to_string(),
            max_conn_num: 100,
            pending_write_num: DEFAULT_PENDING_WRITE_NUM,
            frame: FrameConfig {
                max_msg_len: u32::MAX,
                ..FrameConfig::default()
            },
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            retain_time: DEFAULT_RETAIN_TIME,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ClusterGateConfig {
    /// Cluster 게이트 설정 검증
    pub fn validate(&self) -> ClusterResult<()> {
        if self.tcp_addr.is_empty() {
            return Err(ClusterError::config("Cluster 리스너 주소가 비어있습니다"));
        }
        if self.max_conn_num == 0 || self.pending_write_num == 0 {
            return Err(ClusterError::config(
                "max_conn_num 과 pending_write_num 은 0 일 수 없습니다",
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(ClusterError::config("메일박스 용량은 0 일 수 없습니다"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ClusterError::config("정리 주기는 0 일 수 없습니다"));
        }
        self.frame.validate()
    }
}

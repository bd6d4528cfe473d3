//! 클러스터 세션 라우팅 라이브러리
//!
//! 사용자 접속을 받는 Hall 서버가 사용자별 트래픽을 여러 백엔드(Cluster) 서버 풀로
//! 투명하게 전달하는 라우팅 계층입니다.
//!
//! # 주요 기능
//!
//! - **세션 레지스트리**: 인증된 Hall 세션 추적 (`AgentRegistry`)
//! - **백엔드 선택**: 서버 타입별 선택 정책 (Random, Strict)
//! - **백엔드 링크**: 여러 사용자를 다중화하는 TCP 링크, 논블로킹 송신 큐
//! - **재연결 다이얼러**: 고정 간격 재연결 상태 머신
//! - **Cluster 게이트**: uid 기반 역다중화와 사용자별 순서 보장 액터
//!
//! # 아키텍처
//!
//! ```text
//! Cluster Routing
//! ├── Network Layer (프레임 전송)
//! │   ├── TcpConn (송신 큐 + 읽기 반쪽)
//! │   └── TcpServer (accept 루프)
//! ├── Service Layer (라우팅 로직)
//! │   ├── AgentRegistry / BackendLinkRegistry
//! │   ├── BackendSelector (선택 정책)
//! │   ├── BackendLink / ReconnectingDialer / BackendPool
//! │   ├── HallGate / HeartbeatService
//! │   └── ClusterGate / UserActor
//! ├── Handler Layer (연결 처리)
//! │   ├── HallSession (클라이언트 세션)
//! │   └── InboundLink (Hall → Cluster 링크)
//! ├── Tool Layer (에러, 유틸)
//! └── Protocol (프레임, uid/타입 헤더)
//! ```
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use cluster::{BackendPool, DialerConfig, HallGate, HallGateConfig};
//!
//! let pool = BackendPool::new(DialerConfig::new(""));
//! pool.add_server("127.0.0.1:5000", 1, 0)?;
//!
//! let gate = Arc::new(HallGate::new(HallGateConfig::default(), processor, pool.registry()));
//! gate.start().await?;
//! ```

pub mod config;
pub mod handler;
pub mod network;
pub mod processor;
pub mod protocol;
pub mod service;
pub mod tool;

pub use config::{ClusterGateConfig, DialerConfig, FrameConfig, HallGateConfig};
pub use handler::{HallSession, InboundLink, SessionState};
pub use network::{ConnHandler, ConnReader, ServerOptions, TcpConn, TcpServer};
pub use processor::{JsonCodec, Processor};
pub use protocol::{ByteOrder, MsgParser, ServerId, ServerType, Uid};
pub use service::{
    AgentRegistry, BackendLink, BackendLinkRegistry, BackendPool, BackendSelector, ClusterGate,
    DialerState, HallGate, HallHooks, HeartbeatService, HeartbeatStats, LinkAttachment,
    RandomPolicy, ReconnectingDialer, SelectionPolicy, StrictPolicy, UserActor, UserSession,
};
pub use tool::{ClusterError, ClusterResult, ErrorHandler, ErrorSeverity};

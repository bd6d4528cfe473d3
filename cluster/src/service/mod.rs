//! 라우팅 서비스 레이어
//!
//! # 서비스 구조
//!
//! ```text
//! Service Layer
//! ├── AgentRegistry (키 → 세션 핸들)
//! ├── BackendLinkRegistry / BackendSelector (백엔드 링크 조회와 선택 정책)
//! ├── BackendLink (uid 다중화 링크, 논블로킹 송신)
//! ├── ReconnectingDialer / BackendPool (재연결 상태 머신)
//! ├── HallGate / HeartbeatService (Hall 리스너와 하트비트)
//! └── ClusterGate / UserActor (uid 별 순서 보장 처리)
//! ```

pub mod agent_registry;
pub mod backend_link;
pub mod backend_pool;
pub mod cluster_gate;
pub mod dialer_service;
pub mod hall_gate;
pub mod heartbeat_service;
pub mod link_registry;
pub mod selector;
pub mod user_actor;

pub use agent_registry::AgentRegistry;
pub use backend_link::{BackendLink, LinkAttachment};
pub use backend_pool::BackendPool;
pub use cluster_gate::ClusterGate;
pub use dialer_service::{DialerState, LinkClosedHook, ReconnectingDialer};
pub use hall_gate::{AgentClosedHook, BackendLinkClosedHook, CustomHandler, HallGate, HallHooks};
pub use heartbeat_service::{HeartbeatHandler, HeartbeatService, HeartbeatStats};
pub use link_registry::BackendLinkRegistry;
pub use selector::{BackendSelector, RandomPolicy, SelectionPolicy, StrictPolicy};
pub use user_actor::{UserActor, UserSession};

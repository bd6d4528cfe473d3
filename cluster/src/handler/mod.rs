//! 연결 핸들러 레이어
//!
//! - `HallSession`: 클라이언트 연결 하나 (타입 태그 라우팅)
//! - `InboundLink`: Cluster 프로세스가 받은 Hall 링크 하나 (uid 역다중화)

pub mod hall_session;
pub mod inbound_link;

pub use hall_session::{HallSession, SessionState};
pub use inbound_link::InboundLink;

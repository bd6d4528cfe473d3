//! 서버 공통 라이브러리
//!
//! Hall 서버와 게임 서버가 함께 쓰는 환경 설정 로딩과 로깅 초기화를 제공합니다.

pub mod config;
pub mod logging;

pub use config::env_loader;
pub use logging::{init_logging, LoggingConfig, ServiceType};

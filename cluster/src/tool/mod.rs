//! 클러스터 공통 유틸리티 모듈
//!
//! 에러 처리, 타임스탬프, 프레임 덤프 등 공통 기능을 제공합니다.

pub mod error;
pub mod simple_utils;

pub use error::{ClusterError, ClusterResult, ErrorHandler, ErrorSeverity, FrameError};
pub use simple_utils::SimpleUtils;

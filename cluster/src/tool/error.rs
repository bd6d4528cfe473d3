//! 클러스터 라우팅 에러 처리 시스템
//!
//! Hall/Cluster 라우팅 계층에서 발생하는 모든 에러를 체계적으로 분류합니다.
//!
//! - **Transport**: 읽기/쓰기/다이얼 실패. 해당 연결에 항상 치명적이며 제자리 재시도하지 않습니다.
//! - **Protocol**: 마샬/언마샬 실패, 너무 짧은 프레임. 로그 후 연결을 정리합니다.
//! - **Overload** (`QueueFull`): 호출자에게 동기적으로 반환되며 연결에는 영향을 주지 않습니다.
//! - **Routing** (`NoBackendAvailable`, `NotFound`): 호출자가 결정합니다.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::protocol::{ServerId, ServerType, Uid};

/// 프레임 길이 위반 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("메시지가 너무 깁니다: {len} > {max}")]
    TooLong { len: usize, max: u32 },

    #[error("메시지가 너무 짧습니다: {len} < {min}")]
    TooShort { len: usize, min: u32 },
}

/// 클러스터 라우팅 에러 타입
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("전송 에러: {0}")]
    Transport(#[from] std::io::Error),

    #[error("프레임 에러: {0}")]
    Frame(#[from] FrameError),

    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    #[error("송신 큐가 가득 찼습니다 [서버 타입: {server_type}, 서버 ID: {server_id}]")]
    QueueFull {
        server_type: ServerType,
        server_id: ServerId,
    },

    #[error("사용 가능한 백엔드가 없습니다 [서버 타입: {server_type}]")]
    NoBackendAvailable { server_type: ServerType },

    #[error("백엔드 링크를 찾을 수 없습니다 [서버 타입: {server_type}, 서버 ID: {server_id}]")]
    NotFound {
        server_type: ServerType,
        server_id: ServerId,
    },

    #[error("연결이 이미 닫혔습니다")]
    LinkClosed,

    #[error("인증되지 않은 세션의 전달 요청입니다 [서버 타입: {server_type}]")]
    Unauthenticated { server_type: ServerType },

    #[error("잘못된 사용자 ID: {0}")]
    InvalidUid(Uid),

    #[error("설정 에러: {0}")]
    Config(String),
}

/// 결과 타입 별칭
pub type ClusterResult<T> = Result<T, ClusterError>;

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 정보성 - 정상 동작 중 발생하는 예상 가능한 상황
    Info,
    /// 경고 - 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 에러 - 해당 연결 또는 요청에 영향
    Error,
    /// 치명적 - 부팅 단계의 설정 오류
    Critical,
}

impl ClusterError {
    /// 프로토콜 에러 생성
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// 설정 에러 생성
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 에러의 심각도를 반환합니다.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ClusterError::Config(_) => ErrorSeverity::Critical,
            ClusterError::Transport(_)
            | ClusterError::Frame(_)
            | ClusterError::Protocol(_)
            | ClusterError::Unauthenticated { .. }
            | ClusterError::InvalidUid(_) => ErrorSeverity::Error,
            ClusterError::QueueFull { .. }
            | ClusterError::NoBackendAvailable { .. }
            | ClusterError::NotFound { .. } => ErrorSeverity::Warning,
            ClusterError::LinkClosed => ErrorSeverity::Info,
        }
    }

    /// 해당 메시지만 버리고 연결은 유지해도 되는 에러인지 확인합니다.
    ///
    /// 과부하(`QueueFull`)와 끊어진 백엔드 링크(`LinkClosed`)가 여기에 속합니다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClusterError::QueueFull { .. } | ClusterError::LinkClosed
        )
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Protocol(format!("json: {err}"))
    }
}

/// 에러 핸들러
///
/// 모든 에러를 심각도에 맞는 로그 레벨로 출력합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 처리하고 로깅합니다.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cluster::tool::error::{ClusterError, ErrorHandler};
    ///
    /// let error = ClusterError::NoBackendAvailable { server_type: 3 };
    /// ErrorHandler::handle_error(&error, "HallSession", "forward");
    /// ```
    pub fn handle_error(error: &ClusterError, component: &str, operation: &str) {
        Self::log_with_severity(error, error.severity(), component, operation);
    }

    /// 지정한 심각도로 에러를 로깅합니다.
    pub fn log_with_severity(
        error: &ClusterError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        match severity {
            ErrorSeverity::Info => debug!("[{}] [{}] {}", component, operation, error),
            ErrorSeverity::Warning => warn!("[{}] [{}] {}", component, operation, error),
            ErrorSeverity::Error => error!("[{}] [{}] {}", component, operation, error),
            ErrorSeverity::Critical => {
                error!("🚨 CRITICAL: [{}] [{}] {}", component, operation, error);
                info!("부팅 설정을 확인하세요");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ClusterError::QueueFull {
            server_type: 2,
            server_id: 7,
        };
        let display = error.to_string();
        assert!(display.contains("송신 큐"));
        assert!(display.contains('7'));
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ClusterError::config("bad").severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            ClusterError::NoBackendAvailable { server_type: 1 }.severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(ClusterError::LinkClosed.severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_overload_is_transient() {
        let overload = ClusterError::QueueFull {
            server_type: 1,
            server_id: 0,
        };
        assert!(overload.is_transient());
        assert!(ClusterError::LinkClosed.is_transient());

        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let transport: ClusterError = io_error.into();
        assert!(!transport.is_transient());
        assert!(!ClusterError::NoBackendAvailable { server_type: 1 }.is_transient());
    }

    #[test]
    fn test_frame_error_conversion() {
        let error: ClusterError = FrameError::TooLong { len: 10, max: 4 }.into();
        match error {
            ClusterError::Frame(FrameError::TooLong { len, max }) => {
                assert_eq!(len, 10);
                assert_eq!(max, 4);
            }
            other => panic!("잘못된 에러 변환: {other:?}"),
        }
    }
}

//! 로깅 설정 관리
//!
//! 로깅 초기화 파라미터와 서비스 타입 정의를 담당합니다.

use serde::{Deserialize, Serialize};

use crate::config::{env_bool, env_string, load_env_from};

/// 서비스 타입 열거형
///
/// 로그에 찍히는 서비스 이름을 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// 사용자 접속을 받는 Hall 서버
    HallServer,
    /// 백엔드 게임 서버
    GameServer,
    /// 공유 라이브러리
    Shared,
}

impl ServiceType {
    /// 서비스 타입을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::HallServer => "hallserver",
            ServiceType::GameServer => "gameserver",
            ServiceType::Shared => "shared",
        }
    }
}

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `RUST_LOG`가 없을 때 쓰는 기본 필터 (기본값: info)
    pub default_level: String,

    /// JSON 형식 여부 (기본값: false)
    pub json_format: bool,

    /// 이벤트 target 출력 여부 (기본값: true)
    pub with_target: bool,

    /// 스레드 이름 출력 여부 (기본값: false)
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            json_format: false,
            with_target: true,
            with_thread_names: false,
        }
    }
}

impl LoggingConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_level: env_string("LOG_LEVEL", &defaults.default_level),
            json_format: env_bool("LOG_JSON_FORMAT", defaults.json_format),
            with_target: env_bool("LOG_WITH_TARGET", defaults.with_target),
            with_thread_names: env_bool("LOG_THREAD_NAMES", defaults.with_thread_names),
        }
    }

    /// `.env`를 먼저 로드한 뒤 환경변수에서 설정을 읽습니다.
    ///
    /// 로깅 초기화 전에 호출해야 `.env`의 `LOG_*` 값이 반영됩니다.
    /// 로드한 `.env` 경로를 함께 반환합니다.
    pub fn from_env_file<'a>(paths: &[&'a str]) -> (Self, Option<&'a str>) {
        let loaded = load_env_from(paths);
        (Self::from_env(), loaded)
    }

    /// 설정 유효성 검증
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_level.trim().is_empty() {
            return Err(anyhow::anyhow!("default_level must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_as_str() {
        assert_eq!(ServiceType::HallServer.as_str(), "hallserver");
        assert_eq!(ServiceType::GameServer.as_str(), "gameserver");
        assert_eq!(ServiceType::Shared.as_str(), "shared");
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_level, "info");
        assert!(!config.json_format);
        assert!(config.with_target);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_file_applies_before_logging() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("logging.env");
        std::fs::write(&env_path, "LOG_THREAD_NAMES=true\nLOG_JSON_FORMAT=1\n").unwrap();
        let env_path = env_path.to_string_lossy().to_string();

        let (config, loaded) =
            LoggingConfig::from_env_file(&["/nonexistent/.env", env_path.as_str()]);
        assert_eq!(loaded, Some(env_path.as_str()));
        assert!(config.with_thread_names);
        assert!(config.json_format);
    }

    #[test]
    fn test_config_validation() {
        let config = LoggingConfig {
            default_level: " ".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

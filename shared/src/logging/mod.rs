//! 로깅 초기화
//!
//! `tracing-subscriber` 기반 전역 구독자를 설정합니다.
//!
//! # 사용 예시
//! ```rust,ignore
//! use shared::logging::{init_logging, LoggingConfig, ServiceType};
//!
//! let (config, env_path) = LoggingConfig::from_env_file(&ENV_PATHS);
//! init_logging(ServiceType::HallServer, &config)?;
//! log_env_file(env_path);
//! tracing::info!("Hall 서버 시작");
//! ```

pub mod config;

pub use config::{LoggingConfig, ServiceType};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 로깅 시스템 초기화 함수
///
/// `RUST_LOG`가 있으면 그 필터를, 없으면 `config.default_level`을 사용합니다.
/// 전역 구독자는 한 번만 설정할 수 있으므로 두 번째 호출은 에러를 반환합니다.
pub fn init_logging(service_type: ServiceType, config: &LoggingConfig) -> Result<()> {
    config.validate().context("로깅 설정 유효성 검증 실패")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("로그 필터 생성 실패")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names);

    if config.json_format {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;
    }

    info!("📝 로깅 시스템 초기화 완료 [서비스: {}]", service_type.as_str());
    Ok(())
}

/// `.env` 로드 결과를 출력합니다. 로깅 초기화 뒤에 호출합니다.
pub fn log_env_file(loaded: Option<&str>) {
    match loaded {
        Some(path) => info!(".env 파일 로드 성공: {}", path),
        None => warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_only_once() {
        let config = LoggingConfig::default();
        // 다른 테스트가 먼저 설정했을 수도 있으므로 두 번째 호출만 확인
        let _ = init_logging(ServiceType::Shared, &config);
        assert!(init_logging(ServiceType::Shared, &config).is_err());
    }
}

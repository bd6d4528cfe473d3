//! .env 로딩과 환경변수 조회
//!
//! 각 서버는 시작할 때 로깅보다 먼저 `.env`를 한 번 로드한 뒤
//! `env_or`, `env_string` 등으로 값을 읽습니다. 값이 없거나 잘못되면 기본값을 씁니다.
//! 로드는 로그를 남기지 않으므로 결과는 로깅 초기화 후 호출자가 출력합니다.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// .env 파일 탐색 순서
pub const ENV_PATHS: [&str; 3] = [
    "../.env",    // 상위 디렉토리 (Backend/.env)
    ".env",       // 현재 디렉토리
    "../../.env", // 상위의 상위 디렉토리 (프로젝트 루트)
];

/// 주어진 경로 중 처음으로 존재하는 .env 파일을 로드합니다.
///
/// 로드한 경로를 반환합니다. 없으면 시스템 환경변수만 사용합니다.
/// 기존 환경변수는 덮어쓰지 않습니다.
pub fn load_env_from<'a>(paths: &[&'a str]) -> Option<&'a str> {
    for path in paths {
        if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
            return Some(path);
        }
    }
    None
}

/// 문자열 환경변수 (없으면 기본값)
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 파싱 가능한 환경변수 (없거나 파싱 실패 시 기본값)
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("{} 값이 잘못되었습니다: '{}', 기본값 {} 사용", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// 불리언 환경변수 ("true"/"1" 이면 참)
pub fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

/// 초 단위 기간 환경변수. 0 이면 비활성(None)
pub fn env_secs(key: &str, default: Option<Duration>) -> Option<Duration> {
    let default_secs = default.map(|d| d.as_secs()).unwrap_or(0);
    match env_or(key, default_secs) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

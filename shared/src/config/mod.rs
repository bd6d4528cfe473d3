//! 환경 설정 모듈

pub mod env_loader;

pub use env_loader::{env_bool, env_or, env_secs, env_string, load_env_from, ENV_PATHS};

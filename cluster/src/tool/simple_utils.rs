//! 간단한 공통 유틸리티

/// 로그 출력 시 덤프할 최대 바이트 수
const MAX_DUMP_BYTES: usize = 32;

/// 간단한 데이터 유틸리티
pub struct SimpleUtils;

impl SimpleUtils {
    /// 현재 Unix 타임스탬프 (초)
    pub fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// 바이트를 16진수로 변환합니다.
    ///
    /// 로그가 폭주하지 않도록 앞쪽 32바이트까지만 변환하고 나머지는 `..`로 표시합니다.
    ///
    /// ```rust
    /// use cluster::tool::SimpleUtils;
    ///
    /// assert_eq!(SimpleUtils::bytes_to_hex(b"Hello"), "48656c6c6f");
    /// ```
    pub fn bytes_to_hex(bytes: &[u8]) -> String {
        let mut hex: String = bytes
            .iter()
            .take(MAX_DUMP_BYTES)
            .map(|b| format!("{:02x}", b))
            .collect();
        if bytes.len() > MAX_DUMP_BYTES {
            hex.push_str("..");
        }
        hex
    }
}

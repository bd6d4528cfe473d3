//! 네트워크 계층
//!
//! 길이 헤더 프레임 기반 TCP 연결과 리스너를 제공합니다.

pub mod conn;
pub mod server;

pub use conn::{ConnReader, TcpConn, WriteRejected};
pub use server::{ConnHandler, ServerOptions, TcpServer};

//! 프레임 단위 TCP 리스너
//!
//! 연결마다 태스크 하나를 띄워 `ConnHandler`에 넘깁니다.
//! `close()`는 accept 를 멈추고 모든 연결을 닫은 뒤 처리 태스크가 끝날 때까지 기다립니다.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{ClusterGateConfig, FrameConfig, HallGateConfig};
use crate::network::conn::{ConnReader, TcpConn};
use crate::protocol::MsgParser;
use crate::tool::error::ClusterResult;

/// accept 실패 시 최대 대기 시간
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// 연결 처리기
///
/// 반환되면 연결은 닫힙니다.
#[async_trait]
pub trait ConnHandler: Send + Sync + 'static {
    async fn handle(self: Arc<Self>, conn: Arc<TcpConn>, reader: ConnReader);
}

/// 리스너 설정
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: String,
    pub max_conn_num: usize,
    pub pending_write_num: usize,
    pub frame: FrameConfig,
    pub read_timeout: Option<Duration>,
}

impl From<&HallGateConfig> for ServerOptions {
    fn from(config: &HallGateConfig) -> Self {
        Self {
            addr: config.tcp_addr.clone(),
            max_conn_num: config.max_conn_num,
            pending_write_num: config.pending_write_num,
            frame: config.frame.clone(),
            read_timeout: config.read_timeout,
        }
    }
}

impl From<&ClusterGateConfig> for ServerOptions {
    fn from(config: &ClusterGateConfig) -> Self {
        Self {
            addr: config.tcp_addr.clone(),
            max_conn_num: config.max_conn_num,
            pending_write_num: config.pending_write_num,
            frame: config.frame.clone(),
            read_timeout: None,
        }
    }
}

type ConnTable = Arc<RwLock<HashMap<u64, Arc<TcpConn>>>>;

/// TCP 서버
pub struct TcpServer {
    local_addr: SocketAddr,
    conns: ConnTable,
    stop_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpServer {
    /// 리스너를 바인드하고 accept 루프를 시작합니다.
    pub async fn bind<H: ConnHandler>(
        options: ServerOptions,
        handler: Arc<H>,
    ) -> ClusterResult<Arc<Self>> {
        let listener = TcpListener::bind(&options.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("✅ TCP 리스너 시작: {}", local_addr);

        let conns: ConnTable = Arc::new(RwLock::new(HashMap::new()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            options,
            handler,
            conns.clone(),
            stop_rx,
        ));

        Ok(Arc::new(Self {
            local_addr,
            conns,
            stop_tx,
            accept_task: Mutex::new(Some(accept_task)),
        }))
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 현재 연결 수
    pub fn conn_count(&self) -> usize {
        self.conns.read().len()
    }

    /// 서버 종료
    pub async fn close(&self) {
        self.stop_tx.send_replace(true);
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("accept 태스크 종료 실패: {}", e);
            }
            info!("🛑 TCP 리스너 종료: {}", self.local_addr);
        }
    }
}

async fn accept_loop<H: ConnHandler>(
    listener: TcpListener,
    options: ServerOptions,
    handler: Arc<H>,
    conns: ConnTable,
    mut stop_rx: watch::Receiver<bool>,
) {
    let parser = Arc::new(MsgParser::new(&options.frame));
    let mut tasks = JoinSet::new();
    let mut next_id: u64 = 0;
    let mut backoff = Duration::ZERO;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => {
                        backoff = Duration::ZERO;
                        accepted
                    }
                    Err(e) => {
                        backoff = if backoff.is_zero() {
                            Duration::from_millis(5)
                        } else {
                            (backoff * 2).min(MAX_ACCEPT_BACKOFF)
                        };
                        warn!("accept 실패: {}; {:?} 후 재시도", e, backoff);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                };

                let conn_count = conns.read().len();
                if conn_count >= options.max_conn_num {
                    warn!("최대 연결 수 초과 ({}), 연결 거부: {}", options.max_conn_num, addr);
                    drop(stream);
                    continue;
                }
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY 설정 실패 {}: {}", addr, e);
                }

                let (conn, mut reader) = TcpConn::new(
                    stream,
                    addr.to_string(),
                    parser.clone(),
                    options.pending_write_num,
                );
                reader.set_read_timeout(options.read_timeout);

                next_id += 1;
                let id = next_id;
                conns.write().insert(id, conn.clone());
                debug!("새 연결 수락: {} (#{})", addr, id);

                let handler = handler.clone();
                let conns = conns.clone();
                tasks.spawn(async move {
                    handler.handle(conn.clone(), reader).await;
                    conn.close();
                    conns.write().remove(&id);
                });
            }
        }
    }

    drop(listener);

    let live: Vec<Arc<TcpConn>> = conns.read().values().cloned().collect();
    for conn in &live {
        conn.close();
    }
    while tasks.join_next().await.is_some() {}
    debug!("모든 연결 처리 태스크 종료 ({}개 연결 정리)", live.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::error::ClusterError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpStream;

    /// 받은 프레임을 그대로 돌려주는 처리기
    struct Echo {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl ConnHandler for Echo {
        async fn handle(self: Arc<Self>, conn: Arc<TcpConn>, mut reader: ConnReader) {
            self.handled.fetch_add(1, Ordering::SeqCst);
            while let Ok(data) = reader.read_msg().await {
                if conn.write_msg(&[&data[..]]).is_err() {
                    break;
                }
            }
        }
    }

    fn options(max_conn_num: usize) -> ServerOptions {
        ServerOptions {
            addr: "127.0.0.1:0".to_string(),
            max_conn_num,
            pending_write_num: 16,
            frame: FrameConfig::default(),
            read_timeout: None,
        }
    }

    async fn connect(addr: SocketAddr) -> (Arc<TcpConn>, ConnReader) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let parser = Arc::new(MsgParser::new(&FrameConfig::default()));
        TcpConn::new(stream, addr.to_string(), parser, 16)
    }

    #[tokio::test]
    async fn test_echo_round_trip_and_close() {
        let handler = Arc::new(Echo {
            handled: AtomicUsize::new(0),
        });
        let server = TcpServer::bind(options(10), handler.clone()).await.unwrap();

        let (client, mut reader) = connect(server.local_addr()).await;
        client.write_msg(&[&b"ping"[..]]).unwrap();
        assert_eq!(&reader.read_msg().await.unwrap()[..], b"ping");
        assert_eq!(server.conn_count(), 1);

        server.close().await;
        assert_eq!(server.conn_count(), 0);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);

        // 서버가 닫혔으므로 클라이언트 읽기도 끝남
        let result = reader.read_msg().await;
        assert!(matches!(result, Err(ClusterError::Transport(_))));
    }

    #[tokio::test]
    async fn test_max_conn_num_rejects_excess() {
        let handler = Arc::new(Echo {
            handled: AtomicUsize::new(0),
        });
        let server = TcpServer::bind(options(1), handler.clone()).await.unwrap();

        let (first, mut first_reader) = connect(server.local_addr()).await;
        first.write_msg(&[&b"a"[..]]).unwrap();
        assert_eq!(&first_reader.read_msg().await.unwrap()[..], b"a");

        let (_second, mut second_reader) = connect(server.local_addr()).await;
        assert!(second_reader.read_msg().await.is_err());
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);

        server.close().await;
    }
}

//! 프레임 단위 TCP 연결
//!
//! 스트림을 읽기/쓰기 반쪽으로 나눕니다.
//! - 읽기 반쪽(`ConnReader`)은 세션 루프가 소유합니다.
//! - 쓰기 반쪽은 별도 송신 태스크가 소유하며 제한된 대기 큐에서 프레임을 꺼내 씁니다.

use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::MsgParser;
use crate::tool::error::{ClusterError, ClusterResult};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 송신 큐 투입 실패 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRejected {
    /// 대기 큐가 가득 참
    Full,
    /// 연결이 이미 닫힘
    Closed,
}

/// 연결 종료 상태 (송신 태스크와 공유)
struct CloseState {
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl CloseState {
    /// 처음 닫는 호출이면 true
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.close_tx.send_replace(true);
        true
    }
}

/// 프레임 단위 TCP 연결의 쓰기 쪽 핸들
pub struct TcpConn {
    remote_addr: String,
    parser: Arc<MsgParser>,
    write_tx: mpsc::Sender<Bytes>,
    pending_write_num: usize,
    state: Arc<CloseState>,
    write_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpConn {
    /// 스트림을 감싸 연결을 만들고 송신 태스크를 시작합니다.
    ///
    /// 반환된 `ConnReader`는 호출자의 읽기 루프가 소유해야 합니다.
    pub fn new<S>(
        stream: S,
        remote_addr: impl Into<String>,
        parser: Arc<MsgParser>,
        pending_write_num: usize,
    ) -> (Arc<Self>, ConnReader)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let pending_write_num = pending_write_num.max(1);
        let (reader, writer) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::channel(pending_write_num);
        let (close_tx, close_rx) = watch::channel(false);
        let state = Arc::new(CloseState {
            closed: AtomicBool::new(false),
            close_tx,
        });
        let remote_addr = remote_addr.into();

        let write_task = tokio::spawn(write_loop(
            Box::new(writer),
            write_rx,
            state.close_tx.subscribe(),
            state.clone(),
            remote_addr.clone(),
        ));

        let conn = Arc::new(Self {
            remote_addr,
            parser: parser.clone(),
            write_tx,
            pending_write_num,
            state,
            write_task: Mutex::new(Some(write_task)),
        });

        let reader = ConnReader {
            reader: Box::new(reader),
            parser,
            read_timeout: None,
            close_rx,
        };

        (conn, reader)
    }

    /// 원격 주소
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// 프레임 파서
    pub fn parser(&self) -> &MsgParser {
        &self.parser
    }

    /// 연결이 닫혔는지 확인
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// 송신 대기 중인 프레임 수
    pub fn pending_writes(&self) -> usize {
        self.pending_write_num - self.write_tx.capacity()
    }

    /// 인코딩된 프레임을 대기 큐에 넣습니다. 절대 대기하지 않습니다.
    pub fn enqueue(&self, frame: Bytes) -> Result<(), WriteRejected> {
        if self.is_closed() {
            return Err(WriteRejected::Closed);
        }
        self.write_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WriteRejected::Full,
            mpsc::error::TrySendError::Closed(_) => WriteRejected::Closed,
        })
    }

    /// 여러 조각을 한 프레임으로 보냅니다.
    ///
    /// 대기 큐가 가득 차면 느린 상대로 보고 연결을 즉시 끊습니다.
    pub fn write_msg(&self, parts: &[&[u8]]) -> ClusterResult<()> {
        let frame = self.parser.encode_msg(parts)?;
        match self.enqueue(frame) {
            Ok(()) => Ok(()),
            Err(WriteRejected::Full) => {
                warn!(
                    "송신 큐 가득참 ({}), 연결 강제 종료: {}",
                    self.pending_write_num, self.remote_addr
                );
                self.destroy();
                Err(ClusterError::LinkClosed)
            }
            Err(WriteRejected::Closed) => Err(ClusterError::LinkClosed),
        }
    }

    /// 대기 중인 프레임을 모두 보낸 뒤 연결을 닫습니다.
    pub fn close(&self) {
        if self.state.close() {
            debug!("연결 종료 요청: {}", self.remote_addr);
        }
    }

    /// 대기 중인 프레임을 버리고 즉시 연결을 닫습니다.
    pub fn destroy(&self) {
        self.state.close();
        if let Some(handle) = self.write_task.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TcpConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConn")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 송신 루프: 큐에서 프레임을 꺼내 소켓에 씁니다.
async fn write_loop(
    writer: BoxedWriter,
    mut write_rx: mpsc::Receiver<Bytes>,
    mut close_rx: watch::Receiver<bool>,
    state: Arc<CloseState>,
    remote_addr: String,
) {
    let mut writer = BufWriter::new(writer);

    loop {
        tokio::select! {
            frame = write_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_batch(&mut writer, frame, &mut write_rx).await {
                    debug!("송신 실패 {}: {}", remote_addr, e);
                    break;
                }
            }
            _ = close_rx.changed() => {
                // 닫기 전에 이미 큐에 들어간 프레임은 보냅니다
                while let Ok(frame) = write_rx.try_recv() {
                    if writer.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    state.close();
}

async fn write_batch(
    writer: &mut BufWriter<BoxedWriter>,
    first: Bytes,
    write_rx: &mut mpsc::Receiver<Bytes>,
) -> io::Result<()> {
    writer.write_all(&first).await?;
    while let Ok(frame) = write_rx.try_recv() {
        writer.write_all(&frame).await?;
    }
    writer.flush().await
}

/// 연결의 읽기 쪽
pub struct ConnReader {
    reader: BoxedReader,
    parser: Arc<MsgParser>,
    read_timeout: Option<Duration>,
    close_rx: watch::Receiver<bool>,
}

impl ConnReader {
    /// 프레임 하나를 기다리는 최대 시간 (없으면 무제한)
    pub fn set_read_timeout(&mut self, read_timeout: Option<Duration>) {
        self.read_timeout = read_timeout;
    }

    /// 프레임 하나를 읽습니다.
    ///
    /// 연결이 닫히면 대기 중인 읽기도 `LinkClosed`로 끝납니다.
    pub async fn read_msg(&mut self) -> ClusterResult<Bytes> {
        let Self {
            reader,
            parser,
            read_timeout,
            close_rx,
        } = self;

        if *close_rx.borrow() {
            return Err(ClusterError::LinkClosed);
        }

        let read = async {
            match read_timeout {
                Some(limit) => match tokio::time::timeout(*limit, parser.read_msg(reader)).await {
                    Ok(result) => result,
                    Err(_) => Err(ClusterError::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "읽기 시간 초과",
                    ))),
                },
                None => parser.read_msg(reader).await,
            }
        };

        tokio::select! {
            result = read => result,
            _ = close_rx.changed() => Err(ClusterError::LinkClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use tokio::io::AsyncReadExt;

    fn parser() -> Arc<MsgParser> {
        Arc::new(MsgParser::new(&FrameConfig::default()))
    }

    #[tokio::test]
    async fn test_write_and_read_frames() {
        let (a, b) = tokio::io::duplex(1024);
        let (conn_a, _reader_a) = TcpConn::new(a, "a", parser(), 8);
        let (_conn_b, mut reader_b) = TcpConn::new(b, "b", parser(), 8);

        conn_a.write_msg(&[&b"hello"[..]]).unwrap();
        conn_a.write_msg(&[&b"wor"[..], &b"ld"[..]]).unwrap();

        assert_eq!(&reader_b.read_msg().await.unwrap()[..], b"hello");
        assert_eq!(&reader_b.read_msg().await.unwrap()[..], b"world");
    }

    #[tokio::test]
    async fn test_enqueue_full_without_blocking() {
        let (a, _b) = tokio::io::duplex(16);
        let (conn, _reader) = TcpConn::new(a, "a", parser(), 2);

        // 송신 태스크가 아직 폴링되지 않았으므로 큐는 비워지지 않음
        assert!(conn.enqueue(Bytes::from_static(b"1")).is_ok());
        assert!(conn.enqueue(Bytes::from_static(b"2")).is_ok());
        assert_eq!(conn.enqueue(Bytes::from_static(b"3")), Err(WriteRejected::Full));
        assert_eq!(conn.pending_writes(), 2);
    }

    #[tokio::test]
    async fn test_write_msg_on_full_queue_destroys() {
        let (a, _b) = tokio::io::duplex(16);
        let (conn, _reader) = TcpConn::new(a, "a", parser(), 1);

        conn.write_msg(&[&b"1"[..]]).unwrap();
        assert!(matches!(conn.write_msg(&[&b"2"[..]]), Err(ClusterError::LinkClosed)));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (a, _b) = tokio::io::duplex(64);
        let (conn, mut reader) = TcpConn::new(a, "a", parser(), 4);

        let read = tokio::spawn(async move { reader.read_msg().await });
        tokio::task::yield_now().await;
        conn.close();

        let result = read.await.unwrap();
        assert!(matches!(result, Err(ClusterError::LinkClosed)));
        assert!(matches!(
            conn.enqueue(Bytes::from_static(b"x")),
            Err(WriteRejected::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_queued_frames() {
        let (a, mut b) = tokio::io::duplex(1024);
        let (conn, _reader) = TcpConn::new(a, "a", parser(), 4);

        conn.write_msg(&[&b"bye"[..]]).unwrap();
        conn.close();

        let mut received = Vec::new();
        b.read_to_end(&mut received).await.unwrap();
        // 길이 헤더(2바이트, LE) + 본문
        assert_eq!(received, vec![3, 0, b'b', b'y', b'e']);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (a, _b) = tokio::io::duplex(64);
        let (_conn, mut reader) = TcpConn::new(a, "a", parser(), 4);
        reader.set_read_timeout(Some(Duration::from_secs(5)));

        let result = reader.read_msg().await;
        match result {
            Err(ClusterError::Transport(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("시간 초과가 아님: {other:?}"),
        }
    }
}

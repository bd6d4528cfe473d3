//! Cluster 측 수신 링크
//!
//! Hall 프로세스가 연결해 온 다중화 연결 하나를 처리합니다.
//! 수신 프레임 `[uid][페이로드]`에서 uid 를 떼어 `ClusterGate::dispatch`로 넘깁니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::network::{ConnReader, TcpConn};
use crate::processor::Processor;
use crate::protocol::{split_uid, ByteOrder, Uid};
use crate::service::cluster_gate::ClusterGate;
use crate::service::user_actor::UserSession;
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Hall → Cluster 수신 링크
pub struct InboundLink {
    id: u64,
    conn: Arc<TcpConn>,
    byte_order: ByteOrder,
}

impl InboundLink {
    pub fn new(conn: Arc<TcpConn>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            byte_order: conn.parser().byte_order(),
            conn,
        })
    }

    /// 프로세스 안에서 유일한 링크 번호
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> &str {
        self.conn.remote_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// `[uid][parts...]` 프레임을 Hall 로 보냅니다.
    pub fn write(&self, uid: Uid, parts: &[&[u8]]) -> ClusterResult<()> {
        let header = self.byte_order.encode_uid(uid);
        let mut frame: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
        frame.push(&header[..]);
        frame.extend_from_slice(parts);
        self.conn.write_msg(&frame)
    }

    pub fn close(&self) {
        self.conn.close();
    }

    /// 수신 루프
    ///
    /// 짧은 프레임이나 역직렬화 실패는 연결을 정리합니다.
    pub async fn run<P>(self: &Arc<Self>, mut reader: ConnReader, gate: &ClusterGate<P>)
    where
        P: Processor<UserSession<P>>,
    {
        info!("🔗 Hall 링크 수락 [링크: {}] {}", self.id, self.remote_addr());

        loop {
            let data = match reader.read_msg().await {
                Ok(data) => data,
                Err(ClusterError::LinkClosed) => break,
                Err(e) => {
                    debug!("Hall 링크 읽기 종료 {}: {}", self.remote_addr(), e);
                    break;
                }
            };

            let (uid, payload) = match split_uid(self.byte_order, data) {
                Ok(parts) => parts,
                Err(e) => {
                    ErrorHandler::handle_error(&e, "InboundLink", "split_uid");
                    break;
                }
            };

            let msg = match gate.processor().unmarshal(&payload) {
                Ok(msg) => msg,
                Err(e) => {
                    ErrorHandler::handle_error(&e, "InboundLink", "unmarshal");
                    break;
                }
            };

            gate.dispatch(uid, msg, self).await;
        }

        self.conn.close();
        info!("Hall 링크 종료 [링크: {}] {}", self.id, self.remote_addr());
    }
}

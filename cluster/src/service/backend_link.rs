//! 백엔드 링크
//!
//! Hall 프로세스에서 백엔드 인스턴스 하나로 가는 다중화 TCP 연결입니다.
//! 여러 사용자의 트래픽이 `[uid][payload]` 프레임으로 한 연결을 공유합니다.
//!
//! - 송신: `forward`는 논블로킹으로 큐에 넣고, 가득 차면 즉시 `QueueFull`을 돌려줍니다.
//! - 수신: uid 로 연결된 세션을 찾아 페이로드를 넘깁니다. 없으면 버립니다.
//! - 종료: 연결된 모든 세션에 `(uid, serverType, serverId)`로 알립니다.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::network::{ConnReader, TcpConn, WriteRejected};
use crate::protocol::{split_uid, ByteOrder, ServerId, ServerType, Uid};
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};
use crate::tool::SimpleUtils;

/// 백엔드 링크에 연결되는 세션
///
/// Hall 세션이 구현하며, 링크는 이 트레이트로만 세션을 참조합니다.
pub trait LinkAttachment: Send + Sync {
    /// 백엔드가 보낸 페이로드 전달
    fn deliver(&self, server_type: ServerType, payload: Bytes);

    /// 링크 종료 통지
    fn on_link_closed(&self, uid: Uid, server_type: ServerType, server_id: ServerId);
}

/// 하나의 백엔드 인스턴스로 가는 다중화 링크
pub struct BackendLink {
    server_type: ServerType,
    server_id: ServerId,
    byte_order: ByteOrder,
    conn: Arc<TcpConn>,
    attachments: RwLock<HashMap<Uid, Arc<dyn LinkAttachment>>>,
}

impl BackendLink {
    pub fn new(server_type: ServerType, server_id: ServerId, conn: Arc<TcpConn>) -> Arc<Self> {
        Arc::new(Self {
            server_type,
            server_id,
            byte_order: conn.parser().byte_order(),
            conn,
            attachments: RwLock::new(HashMap::new()),
        })
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn remote_addr(&self) -> &str {
        self.conn.remote_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// 송신 큐에 대기 중인 프레임 수
    pub fn pending_writes(&self) -> usize {
        self.conn.pending_writes()
    }

    /// uid 헤더를 붙여 백엔드로 보냅니다.
    ///
    /// 절대 대기하지 않습니다. 큐가 가득 차면 `QueueFull`을 즉시 반환합니다.
    pub fn forward(&self, uid: Uid, payload: &[u8]) -> ClusterResult<()> {
        let header = self.byte_order.encode_uid(uid);
        let frame = self.conn.parser().encode_msg(&[&header[..], payload])?;

        match self.conn.enqueue(frame) {
            Ok(()) => Ok(()),
            Err(WriteRejected::Full) => Err(ClusterError::QueueFull {
                server_type: self.server_type,
                server_id: self.server_id,
            }),
            Err(WriteRejected::Closed) => Err(ClusterError::LinkClosed),
        }
    }

    /// 세션을 uid 로 연결합니다. 같은 uid 의 이전 세션은 교체됩니다.
    pub fn attach(&self, uid: Uid, session: Arc<dyn LinkAttachment>) {
        self.attachments.write().insert(uid, session);
    }

    /// 현재 연결된 세션이 `session`일 때만 분리합니다.
    pub fn detach_if_same(&self, uid: Uid, session: &Arc<dyn LinkAttachment>) -> bool {
        let mut attachments = self.attachments.write();
        match attachments.get(&uid) {
            Some(current) if same_session(current, session) => {
                attachments.remove(&uid);
                true
            }
            _ => false,
        }
    }

    pub fn attached_count(&self) -> usize {
        self.attachments.read().len()
    }

    pub fn is_attached(&self, uid: Uid) -> bool {
        self.attachments.read().contains_key(&uid)
    }

    /// 연결 종료 요청 (대기 중 프레임은 보낸 뒤 닫힘)
    pub fn close(&self) {
        self.conn.close();
    }

    /// 수신 루프. 연결이 끊어지면 연결된 세션에 종료를 알리고 반환합니다.
    pub async fn run(&self, mut reader: ConnReader) {
        info!(
            "🔗 백엔드 링크 시작 [서버 타입: {}, 서버 ID: {}] {}",
            self.server_type,
            self.server_id,
            self.remote_addr()
        );

        loop {
            let data = match reader.read_msg().await {
                Ok(data) => data,
                Err(ClusterError::LinkClosed) => break,
                Err(e) => {
                    debug!("백엔드 링크 읽기 종료: {}", e);
                    break;
                }
            };

            let (uid, payload) = match split_uid(self.byte_order, data) {
                Ok(parts) => parts,
                Err(e) => {
                    ErrorHandler::handle_error(&e, "BackendLink", "split_uid");
                    break;
                }
            };

            let session = self.attachments.read().get(&uid).cloned();
            match session {
                Some(session) => session.deliver(self.server_type, payload),
                None => warn!(
                    "연결된 세션 없음, 프레임 폐기 [uid: {}, 서버 타입: {}] {}",
                    uid,
                    self.server_type,
                    SimpleUtils::bytes_to_hex(&payload)
                ),
            }
        }

        self.conn.close();
        self.notify_closed();
    }

    /// 연결된 모든 세션에 종료를 알립니다.
    fn notify_closed(&self) {
        let sessions: Vec<(Uid, Arc<dyn LinkAttachment>)> =
            self.attachments.write().drain().collect();

        warn!(
            "백엔드 링크 종료 [서버 타입: {}, 서버 ID: {}], 연결 세션 {}개",
            self.server_type,
            self.server_id,
            sessions.len()
        );

        for (uid, session) in sessions {
            session.on_link_closed(uid, self.server_type, self.server_id);
        }
    }
}

impl std::fmt::Debug for BackendLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLink")
            .field("server_type", &self.server_type)
            .field("server_id", &self.server_id)
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

/// 트레이트 객체의 데이터 포인터만 비교합니다.
fn same_session(a: &Arc<dyn LinkAttachment>, b: &Arc<dyn LinkAttachment>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

//! Hall 세션
//!
//! 사용자 한 명의 클라이언트 연결을 처리합니다.
//!
//! 수신 프레임은 `[2바이트 서버 타입][페이로드]`입니다.
//! - 타입 0: Hall 에서 직접 역직렬화 후 `Processor::route`
//! - 타입 T: 타입 T 백엔드로 전달. 처음이면 선택기로 링크를 골라 캐시하고 링크에 세션을 연결합니다.
//!
//! 인증 전(uid = 0)의 전달 요청은 거부하고 연결을 끊습니다.

use bytes::Bytes;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::network::{ConnReader, TcpConn};
use crate::processor::Processor;
use crate::protocol::{split_server_type, ServerId, ServerType, Uid, LOCAL_SERVER_TYPE};
use crate::service::backend_link::{BackendLink, LinkAttachment};
use crate::service::hall_gate::HallGate;
use crate::service::selector::BackendSelector;
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 로그인 전 (uid = 0)
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Hall 세션
pub struct HallSession<P> {
    gate: Arc<HallGate<P>>,
    conn: Arc<TcpConn>,
    uid: AtomicU64,
    closed: AtomicBool,
    remote_links: RwLock<HashMap<ServerType, Arc<BackendLink>>>,
    selector: BackendSelector,
    user_data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    weak_self: Weak<HallSession<P>>,
}

impl<P> HallSession<P>
where
    P: Processor<HallSession<P>>,
{
    pub fn new(gate: Arc<HallGate<P>>, conn: Arc<TcpConn>) -> Arc<Self> {
        let selector =
            BackendSelector::with_policies(gate.links().clone(), gate.default_policies().clone());
        Arc::new_cyclic(|weak_self| Self {
            gate,
            conn,
            uid: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            remote_links: RwLock::new(HashMap::new()),
            selector,
            user_data: RwLock::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// 세션 uid (0 = 인증 전)
    pub fn uid(&self) -> Uid {
        self.uid.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            SessionState::Closed
        } else if self.uid() == 0 {
            SessionState::Unauthenticated
        } else {
            SessionState::Authenticated
        }
    }

    pub fn remote_addr(&self) -> &str {
        self.conn.remote_addr()
    }

    pub fn gate(&self) -> &Arc<HallGate<P>> {
        &self.gate
    }

    /// 세션별 선택기 (정책 재정의용)
    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    /// 로그인 처리: uid 를 설정하고 세션 레지스트리에 등록합니다.
    ///
    /// 같은 uid 로 등록되어 있던 이전 세션이 있으면 반환합니다.
    pub fn login(&self, uid: Uid) -> ClusterResult<Option<Arc<Self>>> {
        if uid == 0 {
            return Err(ClusterError::InvalidUid(uid));
        }
        let Some(me) = self.weak_self.upgrade() else {
            return Err(ClusterError::LinkClosed);
        };
        if self.closed.load(Ordering::Acquire) {
            return Err(ClusterError::LinkClosed);
        }

        let previous = self.uid.swap(uid, Ordering::AcqRel);
        if previous != 0 && previous != uid {
            self.gate.agents().remove_if_same(&previous, &me);
        }

        let replaced = self
            .gate
            .agents()
            .put(uid, me.clone())
            .filter(|old| !Arc::ptr_eq(old, &me));
        if replaced.is_some() {
            warn!("uid {} 의 기존 세션이 새 세션으로 교체되었습니다", uid);
        }
        info!("👤 로그인 완료 [uid: {}] {}", uid, self.remote_addr());
        Ok(replaced)
    }

    /// 수신 루프. 연결이 끝나면 종료 처리를 수행합니다.
    pub async fn run(self: &Arc<Self>, mut reader: ConnReader) {
        debug!("Hall 세션 시작: {}", self.remote_addr());

        loop {
            let data = match reader.read_msg().await {
                Ok(data) => data,
                Err(ClusterError::LinkClosed) => break,
                Err(e) => {
                    debug!("Hall 세션 읽기 종료 {}: {}", self.remote_addr(), e);
                    break;
                }
            };

            if let Err(e) = self.handle_frame(data).await {
                ErrorHandler::handle_error(&e, "HallSession", "handle_frame");
                break;
            }
        }

        self.on_close();
    }

    async fn handle_frame(&self, data: Bytes) -> ClusterResult<()> {
        let (server_type, payload) = split_server_type(self.gate.byte_order(), data)?;

        if server_type == LOCAL_SERVER_TYPE {
            let processor = self.gate.processor();
            let msg = processor.unmarshal(&payload)?;
            return processor.route(msg, self).await;
        }

        match self.forward(server_type, &payload) {
            Ok(()) => Ok(()),
            // 과부하와 끊어진 링크는 해당 메시지만 버림
            Err(e) if e.is_transient() => {
                ErrorHandler::handle_error(&e, "HallSession", "forward");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 타입 T 백엔드로 페이로드를 전달합니다.
    ///
    /// 캐시된 링크가 없으면 선택기로 고르고 캐시합니다. 선택 실패는 그대로 반환됩니다.
    pub fn forward(&self, server_type: ServerType, payload: &[u8]) -> ClusterResult<()> {
        let uid = self.uid();
        if uid == 0 {
            return Err(ClusterError::Unauthenticated { server_type });
        }

        let link = self.resolve_link(server_type)?;
        let result = link.forward(uid, payload);
        if matches!(result, Err(ClusterError::LinkClosed)) {
            self.drop_cached_link(server_type, &link);
        }
        result
    }

    fn resolve_link(&self, server_type: ServerType) -> ClusterResult<Arc<BackendLink>> {
        if let Some(link) = self.backend_link(server_type) {
            return Ok(link);
        }
        let link = self.selector.select(server_type)?;
        self.set_backend_link(link.clone(), server_type);
        debug!(
            "백엔드 선택 [uid: {}, 서버 타입: {}, 서버 ID: {}]",
            self.uid(),
            server_type,
            link.server_id()
        );
        Ok(link)
    }

    /// 캐시된 타입 T 링크
    pub fn backend_link(&self, server_type: ServerType) -> Option<Arc<BackendLink>> {
        self.remote_links.read().get(&server_type).cloned()
    }

    /// 타입 T 링크를 지정하고 링크에 세션을 연결합니다.
    pub fn set_backend_link(&self, link: Arc<BackendLink>, server_type: ServerType) {
        let Some(me) = self.attachment() else {
            return;
        };
        let uid = self.uid();
        let previous = self
            .remote_links
            .write()
            .insert(server_type, link.clone());
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &link) {
                previous.detach_if_same(uid, &me);
            }
        }
        link.attach(uid, me.clone());

        // 연결 도중 세션이 닫혔으면 on_close 가 정리하지 못한 링크를 되돌림
        if self.closed.load(Ordering::Acquire) {
            link.detach_if_same(uid, &me);
            self.drop_cached_link(server_type, &link);
        }
    }

    fn drop_cached_link(&self, server_type: ServerType, link: &Arc<BackendLink>) {
        let mut links = self.remote_links.write();
        if matches!(links.get(&server_type), Some(current) if Arc::ptr_eq(current, link)) {
            links.remove(&server_type);
        }
    }

    fn attachment(&self) -> Option<Arc<dyn LinkAttachment>> {
        let me: Arc<dyn LinkAttachment> = self.weak_self.upgrade()?;
        Some(me)
    }

    /// 메시지를 직렬화해 타입 헤더 없이 보냅니다.
    pub fn write_msg(&self, msg: &P::Msg) -> ClusterResult<()> {
        let parts = self.gate.processor().marshal(msg)?;
        let parts: Vec<&[u8]> = parts.iter().map(|part| part.as_ref()).collect();
        self.conn.write_msg(&parts)
    }

    /// 메시지를 직렬화해 `[타입][메시지]`로 보냅니다.
    pub fn write_msg_with_type(&self, server_type: ServerType, msg: &P::Msg) -> ClusterResult<()> {
        let header = self.gate.byte_order().encode_server_type(server_type);
        let parts = self.gate.processor().marshal(msg)?;

        let mut frame: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
        frame.push(&header[..]);
        frame.extend(parts.iter().map(|part| part.as_ref()));
        self.conn.write_msg(&frame)
    }

    /// 바이트를 `[타입][바이트]`로 보냅니다.
    pub fn write_with_type(&self, server_type: ServerType, bytes: &[u8]) -> ClusterResult<()> {
        let header = self.gate.byte_order().encode_server_type(server_type);
        self.conn.write_msg(&[&header[..], bytes])
    }

    /// 바이트를 그대로 보냅니다.
    pub fn write(&self, bytes: &[u8]) -> ClusterResult<()> {
        self.conn.write_msg(&[bytes])
    }

    /// 캐시된 모든 백엔드 링크로 전달합니다. 성공한 링크 수를 반환합니다.
    pub fn write_to_all_remote(&self, bytes: &[u8]) -> usize {
        let uid = self.uid();
        let links: Vec<Arc<BackendLink>> = self.remote_links.read().values().cloned().collect();

        let mut sent = 0;
        for link in links {
            match link.forward(uid, bytes) {
                Ok(()) => sent += 1,
                Err(e) => ErrorHandler::handle_error(&e, "HallSession", "write_to_all_remote"),
            }
        }
        sent
    }

    /// 사용자 데이터 조회
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.user_data.read().clone()?;
        data.downcast::<T>().ok()
    }

    pub fn set_user_data<T: Any + Send + Sync>(&self, data: T) {
        *self.user_data.write() = Some(Arc::new(data));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 세션을 즉시 정리하고 (레지스트리 제거, 종료 콜백) 대기 중인 응답을 보낸 뒤 연결을 닫습니다.
    pub fn close(&self) {
        match self.weak_self.upgrade() {
            Some(me) => me.on_close(),
            None => self.conn.close(),
        }
    }

    /// 연결만 닫습니다. 정리는 수신 루프가 끝날 때 수행됩니다.
    pub fn kick(&self) {
        self.conn.close();
    }

    /// 대기 중인 응답을 버리고 즉시 연결을 끊습니다.
    pub fn destroy(&self) {
        self.conn.destroy();
    }

    /// 종료 처리 (한 번만 수행)
    fn on_close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let uid = self.uid();
        let links: Vec<Arc<BackendLink>> = self
            .remote_links
            .write()
            .drain()
            .map(|(_, link)| link)
            .collect();
        let me: Arc<dyn LinkAttachment> = self.clone();
        for link in &links {
            link.detach_if_same(uid, &me);
        }

        if uid != 0 {
            self.gate.agents().remove_if_same(&uid, self);
            if let Some(hook) = &self.gate.hooks().agent_closed {
                hook(uid, self);
            }
            info!("👋 세션 종료 [uid: {}] {}", uid, self.remote_addr());
        }

        self.conn.close();
    }
}

impl<P> LinkAttachment for HallSession<P>
where
    P: Processor<HallSession<P>>,
{
    fn deliver(&self, server_type: ServerType, payload: Bytes) {
        if let Err(e) = self.write_with_type(server_type, &payload) {
            ErrorHandler::handle_error(&e, "HallSession", "deliver");
        }
    }

    fn on_link_closed(&self, uid: Uid, server_type: ServerType, server_id: ServerId) {
        {
            let mut links = self.remote_links.write();
            if matches!(links.get(&server_type), Some(link) if link.server_id() == server_id) {
                links.remove(&server_type);
            }
        }
        debug!(
            "백엔드 링크 종료 통지 [uid: {}, 서버 타입: {}, 서버 ID: {}]",
            uid, server_type, server_id
        );
        if let Some(hook) = &self.gate.hooks().backend_link_closed {
            hook(uid, server_type, server_id);
        }
    }
}

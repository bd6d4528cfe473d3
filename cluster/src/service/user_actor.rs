//! 사용자별 액터
//!
//! Cluster 프로세스에서 uid 하나당 메일박스 하나와 처리 태스크 하나를 둡니다.
//! 메일박스는 도착 순서대로 한 번에 하나씩 `Processor::route`로 처리되므로
//! 같은 uid 의 메시지는 어느 Hall 링크로 들어왔든 순서가 보장됩니다.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::handler::InboundLink;
use crate::processor::Processor;
use crate::protocol::Uid;
use crate::tool::error::{ClusterResult, ErrorHandler};

/// `Processor::route`에 넘겨지는 사용자 세션 핸들
///
/// 응답은 가장 최근에 메시지를 보낸 Hall 링크로 나갑니다.
/// 사용자별 상태는 `user_data`에 두면 액터가 정리될 때 함께 사라집니다.
pub struct UserSession<P> {
    uid: Uid,
    link: RwLock<Arc<InboundLink>>,
    processor: Arc<P>,
    user_data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl<P> UserSession<P>
where
    P: Processor<UserSession<P>>,
{
    pub fn new(uid: Uid, link: Arc<InboundLink>, processor: Arc<P>) -> Self {
        Self {
            uid,
            link: RwLock::new(link),
            processor,
            user_data: RwLock::new(None),
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// 현재 응답 링크
    pub fn current_link(&self) -> Arc<InboundLink> {
        self.link.read().clone()
    }

    /// 응답 링크를 교체합니다. 바뀌었으면 true
    pub fn set_link(&self, link: &Arc<InboundLink>) -> bool {
        let mut current = self.link.write();
        if Arc::ptr_eq(&*current, link) {
            return false;
        }
        *current = link.clone();
        true
    }

    /// 사용자 데이터 (타입이 다르면 None)
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.user_data.read().clone()?.downcast::<T>().ok()
    }

    pub fn set_user_data<T: Any + Send + Sync>(&self, data: T) {
        *self.user_data.write() = Some(Arc::new(data));
    }

    /// 타입 T 의 사용자 데이터를 가져오고, 없으면 `init`으로 만들어 저장합니다.
    pub fn user_data_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut slot = self.user_data.write();
        if let Some(data) = slot.clone().and_then(|data| data.downcast::<T>().ok()) {
            return data;
        }
        let data = Arc::new(init());
        *slot = Some(data.clone());
        data
    }

    /// 메시지를 직렬화해 `[uid][메시지]`로 Hall 에 보냅니다.
    pub fn write_msg(&self, msg: &P::Msg) -> ClusterResult<()> {
        let parts = self.processor.marshal(msg)?;
        let parts: Vec<&[u8]> = parts.iter().map(|part| part.as_ref()).collect();
        self.current_link().write(self.uid, &parts)
    }

    /// 바이트를 `[uid][바이트]`로 Hall 에 보냅니다.
    pub fn write(&self, bytes: &[u8]) -> ClusterResult<()> {
        self.current_link().write(self.uid, &[bytes])
    }
}

/// 사용자별 액터
pub struct UserActor<P>
where
    P: Processor<UserSession<P>>,
{
    session: Arc<UserSession<P>>,
    mailbox: mpsc::Sender<P::Msg>,
    last_access: Mutex<Access>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P> UserActor<P>
where
    P: Processor<UserSession<P>>,
{
    /// 액터를 만들고 메일박스 처리 태스크를 시작합니다.
    pub fn spawn(
        uid: Uid,
        link: Arc<InboundLink>,
        processor: Arc<P>,
        mailbox_capacity: usize,
    ) -> Arc<Self> {
        let (mailbox, rx) = mpsc::channel(mailbox_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let session = Arc::new(UserSession::new(uid, link, processor));

        let handle = tokio::spawn(drain(session.clone(), rx, stop_rx));
        debug!("사용자 액터 생성 [uid: {}]", uid);

        Arc::new(Self {
            session,
            mailbox,
            last_access: Mutex::new(Access {
                at: Instant::now(),
                retired: false,
            }),
            stop_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn uid(&self) -> Uid {
        self.session.uid()
    }

    pub fn session(&self) -> &Arc<UserSession<P>> {
        &self.session
    }

    pub fn last_access(&self) -> Instant {
        self.last_access.lock().at
    }

    /// 마지막 접근 시각 갱신. 이미 정리 대상으로 확정됐으면 false
    pub fn touch(&self) -> bool {
        let mut access = self.last_access.lock();
        if access.retired {
            return false;
        }
        access.at = Instant::now();
        true
    }

    /// `retain_time`보다 오래 유휴 상태였으면 정리 대상으로 확정합니다.
    ///
    /// 확정된 뒤에는 `touch`가 실패하므로 새 메시지가 이 액터로 들어오지 않습니다.
    pub fn retire_if_idle(&self, now: Instant, retain_time: Duration) -> bool {
        let mut access = self.last_access.lock();
        if !access.retired && now.saturating_duration_since(access.at) <= retain_time {
            return false;
        }
        access.retired = true;
        true
    }

    /// `now` 기준 유휴 시간
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    /// 메일박스에 넣습니다. 가득 차면 자리가 날 때까지 기다립니다.
    ///
    /// 액터가 이미 멈췄으면 넣지 못한 메시지를 돌려줍니다.
    pub async fn send(&self, msg: P::Msg) -> Result<(), P::Msg> {
        if self.is_stopped() {
            return Err(msg);
        }
        self.mailbox.send(msg).await.map_err(|rejected| rejected.0)
    }

    /// 처리 태스크를 멈춥니다. 아직 처리되지 않은 메시지는 버려집니다.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// 멈추고 처리 태스크가 끝날 때까지 기다립니다.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// 마지막 접근 시각과 정리 확정 여부. 같은 잠금으로 함께 바뀜
struct Access {
    at: Instant,
    retired: bool,
}

async fn drain<P>(
    session: Arc<UserSession<P>>,
    mut rx: mpsc::Receiver<P::Msg>,
    mut stop_rx: watch::Receiver<bool>,
) where
    P: Processor<UserSession<P>>,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        if let Err(e) = session.processor.route(msg, &session).await {
            ErrorHandler::handle_error(&e, "UserActor", "route");
        }
    }
    info!("사용자 액터 종료 [uid: {}]", session.uid());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::network::{ConnReader, TcpConn};
    use crate::protocol::{split_uid, ByteOrder, MsgParser};
    use crate::tool::error::ClusterError;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// 받은 순서대로 기록하고 본문을 그대로 돌려보내는 프로세서
    #[derive(Default)]
    struct Recording {
        routed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Processor<UserSession<Recording>> for Recording {
        type Msg = String;

        fn marshal(&self, msg: &String) -> ClusterResult<Vec<Bytes>> {
            Ok(vec![Bytes::copy_from_slice(msg.as_bytes())])
        }

        fn unmarshal(&self, data: &[u8]) -> ClusterResult<String> {
            String::from_utf8(data.to_vec()).map_err(|e| ClusterError::protocol(e.to_string()))
        }

        async fn route(&self, msg: String, session: &UserSession<Recording>) -> ClusterResult<()> {
            tokio::task::yield_now().await;
            self.routed.lock().push(msg.clone());
            session.write_msg(&msg)
        }
    }

    /// Cluster 쪽 링크와 Hall 쪽 연결 (Hall 쪽 핸들을 놓으면 연결이 닫힘)
    fn link() -> (Arc<InboundLink>, (Arc<TcpConn>, ConnReader)) {
        let parser = Arc::new(MsgParser::new(&FrameConfig::default()));
        let (cluster_side, hall_side) = tokio::io::duplex(64 * 1024);
        let (conn, _reader) = TcpConn::new(cluster_side, "hall", parser.clone(), 64);
        (InboundLink::new(conn), TcpConn::new(hall_side, "cluster", parser, 64))
    }

    #[tokio::test]
    async fn test_mailbox_preserves_order() {
        let processor = Arc::new(Recording::default());
        let (link, (_hall, mut hall_reader)) = link();
        let actor = UserActor::spawn(7, link, processor.clone(), 2);

        for msg in ["m1", "m2", "m3", "m4"] {
            actor.send(msg.to_string()).await.unwrap();
        }

        for expected in ["m1", "m2", "m3", "m4"] {
            let frame = hall_reader.read_msg().await.unwrap();
            let (uid, payload) = split_uid(ByteOrder::LittleEndian, frame).unwrap();
            assert_eq!(uid, 7);
            assert_eq!(&payload[..], expected.as_bytes());
        }
        assert_eq!(*processor.routed.lock(), vec!["m1", "m2", "m3", "m4"]);

        actor.shutdown().await;
        assert!(actor.is_stopped());
        assert_eq!(actor.send("late".to_string()).await, Err("late".to_string()));
    }

    #[tokio::test]
    async fn test_set_link_switches_reply_route() {
        let processor = Arc::new(Recording::default());
        let (first, _first_hall) = link();
        let (second, (_second_hall, mut second_reader)) = link();

        let session = UserSession::new(9, first.clone(), processor);
        assert!(!session.set_link(&first));
        assert!(session.set_link(&second));
        assert!(Arc::ptr_eq(&session.current_link(), &second));

        session.write(b"pong").unwrap();
        let frame = second_reader.read_msg().await.unwrap();
        let (uid, payload) = split_uid(ByteOrder::LittleEndian, frame).unwrap();
        assert_eq!(uid, 9);
        assert_eq!(&payload[..], b"pong");
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let (link, _hall) = link();
        let actor = UserActor::spawn(1, link, Arc::new(Recording::default()), 4);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(actor.idle_for(Instant::now()), Duration::from_secs(30));

        assert!(actor.touch());
        assert_eq!(actor.idle_for(Instant::now()), Duration::ZERO);
        actor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_actor_refuses_touch() {
        let (link, _hall) = link();
        let actor = UserActor::spawn(1, link, Arc::new(Recording::default()), 4);
        let retain = Duration::from_secs(60);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!actor.retire_if_idle(Instant::now(), retain));
        assert!(actor.touch());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(actor.retire_if_idle(Instant::now(), retain));
        assert!(!actor.touch());
        // 한 번 확정되면 유지
        assert!(actor.retire_if_idle(Instant::now(), retain));
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_data_lives_with_session() {
        let (link, _hall) = link();
        let session = UserSession::new(3, link, Arc::new(Recording::default()));
        assert!(session.user_data::<u64>().is_none());

        let counter = session.user_data_or_insert_with(|| Mutex::new(0u64));
        *counter.lock() += 1;
        let again = session.user_data_or_insert_with(|| Mutex::new(100u64));
        assert!(Arc::ptr_eq(&counter, &again));
        assert_eq!(*again.lock(), 1);

        // 다른 타입으로 교체
        session.set_user_data("name".to_string());
        assert!(session.user_data::<Mutex<u64>>().is_none());
        assert_eq!(*session.user_data::<String>().unwrap(), "name");
    }
}

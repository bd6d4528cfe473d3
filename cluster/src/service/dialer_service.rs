//! 재연결 다이얼러
//!
//! 백엔드 주소 하나에 대해 `conn_num`개의 연결 시도 루프를 유지합니다.
//!
//! 각 루프는 다음 상태를 오갑니다.
//!
//! ```text
//! Disconnected ─▶ Connecting ─(성공)─▶ Connected ─(소켓 에러)─▶ Disconnected
//!                   │  ▲                                          │
//!                   └──┘ (실패: connect_interval 대기 후 재시도)     └─(auto_reconnect 면 대기 후 재시도)
//! 어느 상태에서든 close() ─▶ Closing
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DialerConfig;
use crate::network::TcpConn;
use crate::protocol::{MsgParser, ServerId, ServerType};
use crate::service::backend_link::BackendLink;
use crate::service::link_registry::BackendLinkRegistry;

/// 연결 시도 루프 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialerState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// 링크 종료 시 호출되는 훅
pub type LinkClosedHook = Arc<dyn Fn(ServerType, ServerId) + Send + Sync>;

/// 백엔드 재연결 다이얼러
pub struct ReconnectingDialer {
    config: DialerConfig,
    server_type: ServerType,
    server_id: ServerId,
    registry: Arc<BackendLinkRegistry>,
    parser: Arc<MsgParser>,
    stop_tx: watch::Sender<bool>,
    states: RwLock<Vec<DialerState>>,
    links: Mutex<HashMap<usize, Arc<BackendLink>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    on_link_closed: Option<LinkClosedHook>,
}

impl ReconnectingDialer {
    /// 다이얼러를 만들고 연결 시도 루프를 시작합니다.
    pub fn start(
        mut config: DialerConfig,
        server_type: ServerType,
        server_id: ServerId,
        registry: Arc<BackendLinkRegistry>,
        on_link_closed: Option<LinkClosedHook>,
    ) -> Arc<Self> {
        config.normalize();
        let conn_num = config.conn_num;
        let (stop_tx, _) = watch::channel(false);

        let dialer = Arc::new(Self {
            parser: Arc::new(MsgParser::new(&config.frame)),
            config,
            server_type,
            server_id,
            registry,
            stop_tx,
            states: RwLock::new(vec![DialerState::Disconnected; conn_num]),
            links: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::with_capacity(conn_num)),
            on_link_closed,
        });

        info!(
            "🔌 백엔드 다이얼러 시작 [서버 타입: {}, 서버 ID: {}] {} (연결 {}개)",
            server_type, server_id, dialer.config.addr, conn_num
        );

        let handles: Vec<JoinHandle<()>> = (0..conn_num)
            .map(|slot| tokio::spawn(dialer.clone().connect_loop(slot)))
            .collect();
        dialer.tasks.lock().extend(handles);

        dialer
    }

    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// 각 연결 슬롯의 현재 상태
    pub fn states(&self) -> Vec<DialerState> {
        self.states.read().clone()
    }

    /// 현재 연결된 링크 수
    pub fn connected_count(&self) -> usize {
        self.links.lock().len()
    }

    fn is_closing(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn set_state(&self, slot: usize, state: DialerState) {
        if let Some(current) = self.states.write().get_mut(slot) {
            *current = state;
        }
    }

    /// 다이얼러를 닫고 모든 연결 시도 루프가 끝날 때까지 기다립니다.
    pub async fn close(&self) {
        // 종료 표시와 링크 스냅샷을 같은 잠금 안에서 처리해야 새 링크가 빠지지 않음
        let live: Vec<Arc<BackendLink>> = {
            let links = self.links.lock();
            self.stop_tx.send_replace(true);
            links.values().cloned().collect()
        };
        for state in self.states.write().iter_mut() {
            *state = DialerState::Closing;
        }

        for link in live {
            link.close();
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("다이얼러 태스크 종료 실패: {}", e);
            }
        }
        info!(
            "🛑 백엔드 다이얼러 종료 [서버 타입: {}, 서버 ID: {}]",
            self.server_type, self.server_id
        );
    }

    async fn connect_loop(self: Arc<Self>, slot: usize) {
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            self.set_state(slot, DialerState::Connecting);
            let Some(stream) = self.dial(&mut stop_rx).await else {
                break;
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY 설정 실패: {}", e);
            }

            let (conn, reader) = TcpConn::new(
                stream,
                self.config.addr.clone(),
                self.parser.clone(),
                self.config.pending_write_num,
            );
            let link = BackendLink::new(self.server_type, self.server_id, conn);

            if !self.attach_link(slot, &link) {
                // 다이얼 직후 close() 가 들어온 경우
                link.close();
                break;
            }
            self.set_state(slot, DialerState::Connected);

            link.run(reader).await;

            self.release_link(slot, &link);
            if let Some(hook) = &self.on_link_closed {
                hook(self.server_type, self.server_id);
            }

            if !self.config.auto_reconnect || self.is_closing() {
                break;
            }
            self.set_state(slot, DialerState::Disconnected);

            tokio::select! {
                _ = tokio::time::sleep(self.config.connect_interval) => {}
                _ = stop_rx.changed() => break,
            }
        }

        if self.is_closing() {
            self.set_state(slot, DialerState::Closing);
        } else {
            self.set_state(slot, DialerState::Disconnected);
        }
        debug!("연결 슬롯 {} 종료 ({})", slot, self.config.addr);
    }

    /// 연결된 링크를 슬롯과 레지스트리에 올립니다. 이미 닫히는 중이면 false
    fn attach_link(&self, slot: usize, link: &Arc<BackendLink>) -> bool {
        let mut links = self.links.lock();
        if self.is_closing() {
            return false;
        }
        links.insert(slot, link.clone());
        self.registry
            .register(self.server_type, self.server_id, link.clone());
        true
    }

    /// 끊긴 링크를 내립니다.
    ///
    /// 레지스트리에는 식별자마다 링크가 하나뿐이므로, 등록돼 있던 링크가 끊기면
    /// 살아 있는 다른 슬롯의 링크를 대신 등록합니다.
    fn release_link(&self, slot: usize, link: &Arc<BackendLink>) {
        let mut links = self.links.lock();
        links.remove(&slot);

        if !self
            .registry
            .unregister_if_same(self.server_type, self.server_id, link)
        {
            return;
        }
        if self.is_closing() {
            return;
        }
        if let Some(survivor) = links.values().find(|other| !other.is_closed()) {
            self.registry
                .register(self.server_type, self.server_id, survivor.clone());
            info!(
                "🔁 백엔드 링크 교체 [서버 타입: {}, 서버 ID: {}] {}",
                self.server_type,
                self.server_id,
                survivor.remote_addr()
            );
        }
    }

    /// 성공할 때까지 다이얼합니다. 닫히면 None
    async fn dial(&self, stop_rx: &mut watch::Receiver<bool>) -> Option<TcpStream> {
        loop {
            if *stop_rx.borrow() {
                return None;
            }

            let result = tokio::select! {
                result = TcpStream::connect(&self.config.addr) => result,
                _ = stop_rx.changed() => return None,
            };

            match result {
                Ok(stream) => {
                    info!("✅ 백엔드 연결 성공: {}", self.config.addr);
                    return Some(stream);
                }
                Err(e) => warn!(
                    "백엔드 연결 실패 {}: {}; {:?} 후 재시도",
                    self.config.addr, e, self.config.connect_interval
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.connect_interval) => {}
                _ = stop_rx.changed() => return None,
            }
        }
    }
}

//! Hall 게이트
//!
//! 사용자용 리스너를 띄우고 세션 레지스트리를 소유하며 주기적으로 하트비트를 순회합니다.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HallGateConfig;
use crate::handler::hall_session::HallSession;
use crate::network::{ConnHandler, ConnReader, ServerOptions, TcpConn, TcpServer};
use crate::processor::Processor;
use crate::protocol::{ByteOrder, ServerId, ServerType, Uid};
use crate::service::agent_registry::AgentRegistry;
use crate::service::heartbeat_service::{HeartbeatHandler, HeartbeatService, HeartbeatStats};
use crate::service::link_registry::BackendLinkRegistry;
use crate::service::selector::SelectionPolicy;
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};

/// 세션 종료 콜백 (게임 상태 정리용)
pub type AgentClosedHook<P> = Arc<dyn Fn(Uid, &Arc<HallSession<P>>) + Send + Sync>;
/// 세션이 사용하던 백엔드 링크 종료 콜백
pub type BackendLinkClosedHook = Arc<dyn Fn(Uid, ServerType, ServerId) + Send + Sync>;
/// 게이트 시작 직후 실행되는 사용자 정의 핸들러
pub type CustomHandler<P> = Arc<dyn Fn(&Arc<HallGate<P>>) + Send + Sync>;

/// Hall 게이트 훅
pub struct HallHooks<P> {
    pub heartbeat: Option<HeartbeatHandler<Uid, HallSession<P>>>,
    pub agent_closed: Option<AgentClosedHook<P>>,
    pub backend_link_closed: Option<BackendLinkClosedHook>,
    pub custom: Option<CustomHandler<P>>,
}

impl<P> Default for HallHooks<P> {
    fn default() -> Self {
        Self {
            heartbeat: None,
            agent_closed: None,
            backend_link_closed: None,
            custom: None,
        }
    }
}

impl<P> Clone for HallHooks<P> {
    fn clone(&self) -> Self {
        Self {
            heartbeat: self.heartbeat.clone(),
            agent_closed: self.agent_closed.clone(),
            backend_link_closed: self.backend_link_closed.clone(),
            custom: self.custom.clone(),
        }
    }
}

/// Hall 게이트
pub struct HallGate<P> {
    config: HallGateConfig,
    processor: Arc<P>,
    byte_order: ByteOrder,
    agents: Arc<AgentRegistry<Uid, HallSession<P>>>,
    links: Arc<BackendLinkRegistry>,
    default_policies: HashMap<ServerType, Arc<dyn SelectionPolicy>>,
    hooks: HallHooks<P>,
    heartbeat: Mutex<Option<Arc<HeartbeatService<Uid, HallSession<P>>>>>,
    server: Mutex<Option<Arc<TcpServer>>>,
}

impl<P> HallGate<P>
where
    P: Processor<HallSession<P>>,
{
    pub fn new(config: HallGateConfig, processor: Arc<P>, links: Arc<BackendLinkRegistry>) -> Self {
        Self {
            byte_order: ByteOrder::from_little_endian(config.frame.little_endian),
            config,
            processor,
            agents: Arc::new(AgentRegistry::new()),
            links,
            default_policies: HashMap::new(),
            hooks: HallHooks::default(),
            heartbeat: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    /// 훅 설정
    pub fn with_hooks(mut self, hooks: HallHooks<P>) -> Self {
        self.hooks = hooks;
        self
    }

    /// 새 세션마다 복사되는 기본 선택 정책
    pub fn with_default_policy(
        mut self,
        server_type: ServerType,
        policy: Arc<dyn SelectionPolicy>,
    ) -> Self {
        self.default_policies.insert(server_type, policy);
        self
    }

    pub fn config(&self) -> &HallGateConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// 인증된 세션 레지스트리
    pub fn agents(&self) -> &Arc<AgentRegistry<Uid, HallSession<P>>> {
        &self.agents
    }

    pub fn links(&self) -> &Arc<BackendLinkRegistry> {
        &self.links
    }

    pub fn default_policies(&self) -> &HashMap<ServerType, Arc<dyn SelectionPolicy>> {
        &self.default_policies
    }

    pub fn hooks(&self) -> &HallHooks<P> {
        &self.hooks
    }

    /// uid 로 인증된 세션 조회
    pub fn find_session(&self, uid: Uid) -> Option<Arc<HallSession<P>>> {
        self.agents.get(&uid)
    }

    /// 연결 하나에 대한 세션 생성
    pub fn new_session(self: &Arc<Self>, conn: Arc<TcpConn>) -> Arc<HallSession<P>> {
        HallSession::new(self.clone(), conn)
    }

    /// 리스너와 하트비트를 시작합니다. 실제 바인드된 주소를 반환합니다.
    pub async fn start(self: &Arc<Self>) -> ClusterResult<SocketAddr> {
        if let Err(e) = self.config.validate() {
            ErrorHandler::handle_error(&e, "HallGate", "start");
            return Err(e);
        }
        if self.server.lock().is_some() {
            return Err(ClusterError::config("Hall 게이트가 이미 실행 중입니다"));
        }

        info!("🚀 Hall 게이트 시작 중... ({})", self.config.tcp_addr);
        let server = TcpServer::bind(ServerOptions::from(&self.config), self.clone()).await?;
        let local_addr = server.local_addr();
        *self.server.lock() = Some(server);

        match self.config.heartbeat_interval {
            Some(period) => {
                let heartbeat = Arc::new(HeartbeatService::new(
                    self.agents.clone(),
                    period,
                    self.hooks.heartbeat.clone(),
                ));
                heartbeat.start();
                *self.heartbeat.lock() = Some(heartbeat);
            }
            None => warn!("하트비트 주기가 설정되지 않아 하트비트를 건너뜁니다"),
        }

        if let Some(custom) = &self.hooks.custom {
            custom(self);
        }

        info!("✅ Hall 게이트가 {}에서 실행 중입니다", local_addr);
        Ok(local_addr)
    }

    /// 하트비트 통계 (하트비트가 꺼져 있으면 None)
    pub fn heartbeat_stats(&self) -> Option<HeartbeatStats> {
        self.heartbeat
            .lock()
            .as_ref()
            .map(|heartbeat| heartbeat.get_heartbeat_stats())
    }

    /// 게이트를 닫습니다. 모든 세션 연결을 닫고 처리 태스크가 끝날 때까지 기다립니다.
    pub async fn close(&self) {
        let heartbeat = self.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }

        let server = self.server.lock().take();
        if let Some(server) = server {
            server.close().await;
        }

        self.agents.clear();
        info!("🛑 Hall 게이트 종료 완료");
    }
}

#[async_trait]
impl<P> ConnHandler for HallGate<P>
where
    P: Processor<HallSession<P>>,
{
    async fn handle(self: Arc<Self>, conn: Arc<TcpConn>, reader: ConnReader) {
        let session = self.new_session(conn);
        session.run(reader).await;
    }
}

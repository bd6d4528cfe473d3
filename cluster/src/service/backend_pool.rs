//! 백엔드 풀
//!
//! Hall 프로세스가 연결하는 백엔드 서버 목록을 관리합니다.
//! (타입, ID)당 재연결 다이얼러 하나와 공유 링크 레지스트리를 소유합니다.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DialerConfig;
use crate::protocol::{ServerId, ServerType};
use crate::service::dialer_service::{LinkClosedHook, ReconnectingDialer};
use crate::service::link_registry::BackendLinkRegistry;
use crate::tool::error::{ClusterError, ClusterResult};

/// 백엔드 서버 풀
pub struct BackendPool {
    defaults: DialerConfig,
    registry: Arc<BackendLinkRegistry>,
    dialers: RwLock<HashMap<(ServerType, ServerId), Arc<ReconnectingDialer>>>,
    on_link_closed: RwLock<Option<LinkClosedHook>>,
}

impl BackendPool {
    /// `defaults`의 주소를 제외한 값이 모든 다이얼러에 적용됩니다.
    pub fn new(defaults: DialerConfig) -> Self {
        Self::with_registry(defaults, Arc::new(BackendLinkRegistry::new()))
    }

    pub fn with_registry(defaults: DialerConfig, registry: Arc<BackendLinkRegistry>) -> Self {
        Self {
            defaults,
            registry,
            dialers: RwLock::new(HashMap::new()),
            on_link_closed: RwLock::new(None),
        }
    }

    /// 공유 링크 레지스트리
    pub fn registry(&self) -> Arc<BackendLinkRegistry> {
        self.registry.clone()
    }

    /// 이후 추가되는 서버의 링크 종료 훅
    pub fn set_link_closed_hook(&self, hook: LinkClosedHook) {
        *self.on_link_closed.write() = Some(hook);
    }

    /// 백엔드 서버를 추가하고 연결을 시작합니다.
    pub fn add_server(
        &self,
        addr: impl Into<String>,
        server_type: ServerType,
        server_id: ServerId,
    ) -> ClusterResult<()> {
        let config = DialerConfig {
            addr: addr.into(),
            ..self.defaults.clone()
        };
        config.validate()?;

        let mut dialers = self.dialers.write();
        if dialers.contains_key(&(server_type, server_id)) {
            return Err(ClusterError::config(format!(
                "이미 등록된 백엔드 [서버 타입: {}, 서버 ID: {}]",
                server_type, server_id
            )));
        }

        let hook = self.on_link_closed.read().clone();
        let dialer =
            ReconnectingDialer::start(config, server_type, server_id, self.registry.clone(), hook);
        dialers.insert((server_type, server_id), dialer);
        Ok(())
    }

    /// 백엔드 서버를 제거합니다. 다이얼러를 닫고 기다립니다.
    pub async fn remove_server(&self, server_type: ServerType, server_id: ServerId) -> bool {
        let dialer = self.dialers.write().remove(&(server_type, server_id));
        match dialer {
            Some(dialer) => {
                dialer.close().await;
                info!(
                    "백엔드 제거 [서버 타입: {}, 서버 ID: {}]",
                    server_type, server_id
                );
                true
            }
            None => {
                warn!(
                    "제거할 백엔드 없음 [서버 타입: {}, 서버 ID: {}]",
                    server_type, server_id
                );
                false
            }
        }
    }

    /// 등록된 서버 수
    pub fn server_count(&self) -> usize {
        self.dialers.read().len()
    }

    pub fn dialer(&self, server_type: ServerType, server_id: ServerId) -> Option<Arc<ReconnectingDialer>> {
        self.dialers.read().get(&(server_type, server_id)).cloned()
    }

    /// 모든 다이얼러를 닫습니다.
    pub async fn close(&self) {
        let dialers: Vec<Arc<ReconnectingDialer>> =
            self.dialers.write().drain().map(|(_, dialer)| dialer).collect();
        for dialer in dialers {
            dialer.close().await;
        }
        info!("🛑 백엔드 풀 종료");
    }
}

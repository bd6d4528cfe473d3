//! 백엔드 링크 레지스트리
//!
//! 서버 타입 → (서버 ID → 링크) 색인. 프로세스 시작 시 한 번 만들어 각 구성요소에 공유합니다.
//! (타입, ID)당 살아있는 링크는 최대 하나입니다.

use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::protocol::{ServerId, ServerType, Uid};
use crate::service::backend_link::BackendLink;
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};

/// 백엔드 링크 레지스트리
#[derive(Default)]
pub struct BackendLinkRegistry {
    links: RwLock<HashMap<ServerType, BTreeMap<ServerId, Arc<BackendLink>>>>,
}

impl BackendLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 링크를 등록합니다. 같은 (타입, ID)의 기존 링크는 교체되어 반환됩니다.
    pub fn register(
        &self,
        server_type: ServerType,
        server_id: ServerId,
        link: Arc<BackendLink>,
    ) -> Option<Arc<BackendLink>> {
        let replaced = self
            .links
            .write()
            .entry(server_type)
            .or_default()
            .insert(server_id, link);
        info!(
            "백엔드 링크 등록 [서버 타입: {}, 서버 ID: {}]",
            server_type, server_id
        );
        replaced
    }

    /// 등록된 링크가 `link`와 같은 인스턴스일 때만 제거합니다.
    ///
    /// 재연결로 새 링크가 먼저 등록된 경우 새 링크는 남습니다.
    pub fn unregister_if_same(
        &self,
        server_type: ServerType,
        server_id: ServerId,
        link: &Arc<BackendLink>,
    ) -> bool {
        let mut links = self.links.write();
        let Some(by_id) = links.get_mut(&server_type) else {
            return false;
        };
        let same = matches!(by_id.get(&server_id), Some(current) if Arc::ptr_eq(current, link));
        if same {
            by_id.remove(&server_id);
            if by_id.is_empty() {
                links.remove(&server_type);
            }
            debug!(
                "백엔드 링크 해제 [서버 타입: {}, 서버 ID: {}]",
                server_type, server_id
            );
        }
        same
    }

    /// 정확한 (타입, ID) 조회
    pub fn find_exact(
        &self,
        server_type: ServerType,
        server_id: ServerId,
    ) -> ClusterResult<Arc<BackendLink>> {
        self.links
            .read()
            .get(&server_type)
            .and_then(|by_id| by_id.get(&server_id))
            .cloned()
            .ok_or(ClusterError::NotFound {
                server_type,
                server_id,
            })
    }

    /// 타입의 첫 번째 링크 (가장 낮은 서버 ID)
    ///
    /// 인스턴스가 하나뿐인 타입을 위한 조회입니다. ID 0 을 가정하지 않습니다.
    pub fn find_first(&self, server_type: ServerType) -> ClusterResult<Arc<BackendLink>> {
        self.links
            .read()
            .get(&server_type)
            .and_then(|by_id| by_id.values().next())
            .cloned()
            .ok_or(ClusterError::NoBackendAvailable { server_type })
    }

    /// 타입의 링크 중 하나를 균등 확률로 고릅니다.
    pub fn find_random(&self, server_type: ServerType) -> ClusterResult<Arc<BackendLink>> {
        let links = self.links.read();
        links
            .get(&server_type)
            .and_then(|by_id| by_id.values().choose(&mut rand::thread_rng()))
            .cloned()
            .ok_or(ClusterError::NoBackendAvailable { server_type })
    }

    /// `except_type`이 아닌 모든 링크로 전달합니다. 보낸 링크 수를 반환합니다.
    pub fn broadcast(&self, uid: Uid, payload: &[u8], except_type: ServerType) -> usize {
        let targets: Vec<Arc<BackendLink>> = self
            .links
            .read()
            .iter()
            .filter(|(server_type, _)| **server_type != except_type)
            .flat_map(|(_, by_id)| by_id.values().cloned())
            .collect();

        let mut sent = 0;
        for link in targets {
            match link.forward(uid, payload) {
                Ok(()) => sent += 1,
                Err(e) => ErrorHandler::handle_error(&e, "BackendLinkRegistry", "broadcast"),
            }
        }
        sent
    }

    /// 전체 링크 수
    pub fn len(&self) -> usize {
        self.links.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! 백엔드 선택기
//!
//! 서버 타입별로 등록된 선택 정책이 있으면 그 정책을, 없으면 균등 랜덤 선택을 사용합니다.
//! 선택은 호출 시점의 레지스트리만 보며 절대 대기하지 않습니다.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::protocol::{ServerId, ServerType};
use crate::service::backend_link::BackendLink;
use crate::service::link_registry::BackendLinkRegistry;
use crate::tool::error::{ClusterError, ClusterResult};

/// 선택 정책
pub trait SelectionPolicy: Send + Sync + std::fmt::Debug {
    fn select(&self, registry: &BackendLinkRegistry) -> ClusterResult<Arc<BackendLink>>;
}

/// 살아있는 링크 중 균등 랜덤 선택
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    pub server_type: ServerType,
}

impl RandomPolicy {
    pub fn new(server_type: ServerType) -> Self {
        Self { server_type }
    }
}

impl SelectionPolicy for RandomPolicy {
    fn select(&self, registry: &BackendLinkRegistry) -> ClusterResult<Arc<BackendLink>> {
        registry.find_random(self.server_type)
    }
}

/// 지정된 서버 ID 집합에서 하나를 고정 선택
///
/// 여러 ID가 지정되면 가장 낮은 ID를 사용합니다. 그 ID의 링크가 없으면 다른 ID로
/// 넘어가지 않고 실패합니다.
#[derive(Debug, Clone)]
pub struct StrictPolicy {
    pub server_type: ServerType,
    pub server_ids: BTreeSet<ServerId>,
}

impl StrictPolicy {
    pub fn new(server_type: ServerType, server_ids: impl IntoIterator<Item = ServerId>) -> Self {
        Self {
            server_type,
            server_ids: server_ids.into_iter().collect(),
        }
    }
}

impl SelectionPolicy for StrictPolicy {
    fn select(&self, registry: &BackendLinkRegistry) -> ClusterResult<Arc<BackendLink>> {
        let no_backend = ClusterError::NoBackendAvailable {
            server_type: self.server_type,
        };
        let Some(&server_id) = self.server_ids.first() else {
            return Err(no_backend);
        };
        registry
            .find_exact(self.server_type, server_id)
            .map_err(|_| no_backend)
    }
}

/// 세션별 백엔드 선택기
pub struct BackendSelector {
    registry: Arc<BackendLinkRegistry>,
    policies: RwLock<HashMap<ServerType, Arc<dyn SelectionPolicy>>>,
}

impl BackendSelector {
    pub fn new(registry: Arc<BackendLinkRegistry>) -> Self {
        Self::with_policies(registry, HashMap::new())
    }

    /// 기본 정책을 복사해 선택기를 만듭니다.
    pub fn with_policies(
        registry: Arc<BackendLinkRegistry>,
        policies: HashMap<ServerType, Arc<dyn SelectionPolicy>>,
    ) -> Self {
        Self {
            registry,
            policies: RwLock::new(policies),
        }
    }

    /// 서버 타입의 정책을 등록 (기존 정책 교체)
    pub fn set_policy(&self, server_type: ServerType, policy: Arc<dyn SelectionPolicy>) {
        self.policies.write().insert(server_type, policy);
    }

    pub fn remove_policy(&self, server_type: ServerType) -> bool {
        self.policies.write().remove(&server_type).is_some()
    }

    /// 서버 타입의 링크를 선택합니다.
    pub fn select(&self, server_type: ServerType) -> ClusterResult<Arc<BackendLink>> {
        let policy = self.policies.read().get(&server_type).cloned();
        match policy {
            Some(policy) => policy.select(&self.registry),
            None => self.registry.find_random(server_type),
        }
    }

    pub fn registry(&self) -> &Arc<BackendLinkRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::backend_link::tests::link_pair;

    #[tokio::test]
    async fn test_fallback_to_random_lookup() {
        let registry = Arc::new(BackendLinkRegistry::new());
        let selector = BackendSelector::new(registry.clone());

        assert!(matches!(
            selector.select(1),
            Err(ClusterError::NoBackendAvailable { server_type: 1 })
        ));

        let (link, _reader, _backend) = link_pair(1, 4, 4);
        registry.register(1, 4, link.clone());

        let selected = selector.select(1).unwrap();
        assert!(Arc::ptr_eq(&selected, &registry.find_random(1).unwrap()));
        assert!(Arc::ptr_eq(&selected, &link));
    }

    #[tokio::test]
    async fn test_strict_picks_lowest_configured_id() {
        let registry = Arc::new(BackendLinkRegistry::new());
        let (low, _r1, _b1) = link_pair(2, 3, 4);
        let (high, _r2, _b2) = link_pair(2, 8, 4);
        let (unlisted, _r3, _b3) = link_pair(2, 1, 4);
        registry.register(2, 3, low.clone());
        registry.register(2, 8, high);
        registry.register(2, 1, unlisted);

        let selector = BackendSelector::new(registry.clone());
        selector.set_policy(2, Arc::new(StrictPolicy::new(2, [8, 3])));

        for _ in 0..20 {
            assert!(Arc::ptr_eq(&selector.select(2).unwrap(), &low));
        }
    }

    #[tokio::test]
    async fn test_strict_fails_without_live_link() {
        let registry = Arc::new(BackendLinkRegistry::new());
        let (other, _r, _b) = link_pair(2, 9, 4);
        registry.register(2, 9, other);

        let selector = BackendSelector::new(registry);
        selector.set_policy(2, Arc::new(StrictPolicy::new(2, [3])));
        assert!(matches!(
            selector.select(2),
            Err(ClusterError::NoBackendAvailable { server_type: 2 })
        ));

        selector.set_policy(2, Arc::new(StrictPolicy::new(2, [])));
        assert!(selector.select(2).is_err());

        assert!(selector.remove_policy(2));
        assert_eq!(selector.select(2).unwrap().server_id(), 9);
    }

    #[tokio::test]
    async fn test_random_policy() {
        let registry = Arc::new(BackendLinkRegistry::new());
        let (link, _r, _b) = link_pair(5, 0, 4);
        registry.register(5, 0, link.clone());

        let policy = RandomPolicy::new(5);
        assert!(Arc::ptr_eq(&policy.select(&registry).unwrap(), &link));
        assert!(RandomPolicy::new(6).select(&registry).is_err());
    }
}

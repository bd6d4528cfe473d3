//! 세션 레지스트리
//!
//! 키 → 세션 핸들 맵. 읽기는 동시에, 쓰기는 배타적으로 수행됩니다.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// 동시성 안전한 세션 레지스트리
///
/// 값은 `Arc`로 보관하며, `remove_if_same`은 포인터 동일성으로 비교합니다.
pub struct AgentRegistry<K, V: ?Sized> {
    agents: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for AgentRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> AgentRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// 키에 값을 넣습니다. 기존 값이 있으면 교체하고 반환합니다.
    pub fn put(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        self.agents.write().insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.agents.read().get(key).cloned()
    }

    /// 키가 없을 때만 `create`로 만든 값을 넣습니다.
    ///
    /// 새로 만들었으면 두 번째 값이 true 입니다. `create`는 쓰기 락 안에서 호출됩니다.
    pub fn get_or_insert_with(&self, key: K, create: impl FnOnce() -> Arc<V>) -> (Arc<V>, bool) {
        if let Some(existing) = self.get(&key) {
            return (existing, false);
        }

        let mut agents = self.agents.write();
        if let Some(existing) = agents.get(&key) {
            return (existing.clone(), false);
        }
        let value = create();
        agents.insert(key, value.clone());
        (value, true)
    }

    /// 키를 제거합니다. 존재했으면 true
    pub fn remove(&self, key: &K) -> bool {
        self.agents.write().remove(key).is_some()
    }

    /// 현재 저장된 값이 `value`와 같은 인스턴스일 때만 제거합니다.
    ///
    /// 같은 키로 새 세션이 들어온 뒤 이전 세션이 닫혀도 새 세션은 지워지지 않습니다.
    pub fn remove_if_same(&self, key: &K, value: &Arc<V>) -> bool {
        let mut agents = self.agents.write();
        match agents.get(key) {
            Some(current) if Arc::ptr_eq(current, value) => {
                agents.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// 순회용 얕은 복사본
    ///
    /// 콜백 실행 중에 락을 잡지 않도록 복사본을 돌려줍니다.
    pub fn snapshot(&self) -> Vec<(K, Arc<V>)> {
        self.agents
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.agents.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_existing() {
        let registry: AgentRegistry<u64, String> = AgentRegistry::new();
        let v1 = Arc::new("v1".to_string());
        let v2 = Arc::new("v2".to_string());

        assert!(registry.put(7, v1.clone()).is_none());
        assert_eq!(registry.len(), 1);

        let replaced = registry.put(7, v2.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &v1));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(&7).unwrap(), &v2));
    }

    #[test]
    fn test_remove_if_same_guards_replaced_entry() {
        let registry: AgentRegistry<u64, String> = AgentRegistry::new();
        let v1 = Arc::new("same".to_string());
        let v2 = Arc::new("same".to_string());

        registry.put(1, v1.clone());
        registry.put(1, v2.clone());

        // 내용이 같아도 다른 인스턴스는 지우지 않음
        assert!(!registry.remove_if_same(&1, &v1));
        assert!(Arc::ptr_eq(&registry.get(&1).unwrap(), &v2));

        assert!(registry.remove_if_same(&1, &v2));
        assert!(registry.get(&1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_creates_once() {
        let registry: AgentRegistry<u64, String> = AgentRegistry::new();

        let (first, created) = registry.get_or_insert_with(3, || Arc::new("a".to_string()));
        assert!(created);
        let (second, created) = registry.get_or_insert_with(3, || Arc::new("b".to_string()));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "a");
    }

    #[test]
    fn test_remove_and_clear() {
        let registry: AgentRegistry<u64, u32> = AgentRegistry::new();
        registry.put(1, Arc::new(10));
        registry.put(2, Arc::new(20));

        assert!(registry.remove(&1));
        assert!(!registry.remove(&1));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry: AgentRegistry<u64, u32> = AgentRegistry::new();
        registry.put(1, Arc::new(10));
        registry.put(2, Arc::new(20));

        let snapshot = registry.snapshot();
        // 스냅샷 순회 중 쓰기를 해도 교착되지 않음
        for (key, _) in &snapshot {
            registry.remove(key);
        }
        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_puts() {
        let registry: Arc<AgentRegistry<u64, u64>> = Arc::new(AgentRegistry::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        registry.put(i, Arc::new(t));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}

//! 하트비트 서비스
//!
//! 주기적으로 세션 레지스트리의 스냅샷을 순회하며 하트비트 핸들러를 호출합니다.
//! 락을 잡은 채로 핸들러를 부르지 않습니다.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::agent_registry::AgentRegistry;
use crate::tool::SimpleUtils;

/// 세션 하나에 대해 호출되는 하트비트 핸들러
pub type HeartbeatHandler<K, V> = Arc<dyn Fn(&K, &Arc<V>) + Send + Sync>;

/// 하트비트 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatStats {
    /// 실행된 순회 횟수
    pub total_ticks: u64,
    /// 지금까지 방문한 세션 수 합계
    pub sessions_visited: u64,
    /// 마지막 순회 시각 (Unix timestamp)
    pub last_sweep_timestamp: Option<i64>,
    /// 마지막 순회 시점의 세션 수
    pub active_sessions: usize,
    #[serde(skip)]
    pub last_sweep_time: Option<Instant>,
}

/// 하트비트 서비스
pub struct HeartbeatService<K, V: ?Sized> {
    registry: Arc<AgentRegistry<K, V>>,
    interval: Duration,
    handler: Option<HeartbeatHandler<K, V>>,
    stats: Arc<Mutex<HeartbeatStats>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> HeartbeatService<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: ?Sized + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<AgentRegistry<K, V>>,
        interval: Duration,
        handler: Option<HeartbeatHandler<K, V>>,
    ) -> Self {
        Self {
            registry,
            interval,
            handler,
            stats: Arc::new(Mutex::new(HeartbeatStats::default())),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// 하트비트 순회 시작
    pub fn start(&self) {
        let mut stop_slot = self.stop_tx.lock();
        if stop_slot.is_some() {
            warn!("하트비트 시스템이 이미 실행 중입니다");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *stop_slot = Some(stop_tx);
        drop(stop_slot);

        info!("🔄 하트비트 시스템 시작 ({:?} 간격)", self.interval);

        let registry = self.registry.clone();
        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 첫 tick 은 즉시 반환되므로 건너뜀
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&registry, handler.as_ref(), &stats);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("하트비트 순회 작업 종료");
        });

        *self.handle.lock() = Some(handle);
    }

    /// 하트비트 순회 중지
    pub async fn stop(&self) {
        let Some(stop_tx) = self.stop_tx.lock().take() else {
            warn!("하트비트 시스템이 이미 중지되어 있습니다");
            return;
        };
        stop_tx.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("✅ 하트비트 시스템 중지 완료");
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().is_some()
    }

    /// 즉시 한 번 순회합니다. 방문한 세션 수를 반환합니다.
    pub fn tick_now(&self) -> usize {
        sweep(&self.registry, self.handler.as_ref(), &self.stats)
    }

    pub fn get_heartbeat_stats(&self) -> HeartbeatStats {
        self.stats.lock().clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn sweep<K, V>(
    registry: &AgentRegistry<K, V>,
    handler: Option<&HeartbeatHandler<K, V>>,
    stats: &Mutex<HeartbeatStats>,
) -> usize
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    let snapshot = registry.snapshot();
    debug!("하트비트 순회 - 세션 {}개", snapshot.len());

    if let Some(handler) = handler {
        for (key, session) in &snapshot {
            handler(key, session);
        }
    }

    let mut stats = stats.lock();
    stats.total_ticks += 1;
    stats.sessions_visited += snapshot.len() as u64;
    stats.active_sessions = snapshot.len();
    stats.last_sweep_time = Some(Instant::now());
    stats.last_sweep_timestamp = Some(SimpleUtils::current_timestamp());
    snapshot.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> HeartbeatHandler<u64, String> {
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_tick_now_visits_snapshot() {
        let registry = Arc::new(AgentRegistry::new());
        registry.put(1u64, Arc::new("a".to_string()));
        registry.put(2u64, Arc::new("b".to_string()));

        let counter = Arc::new(AtomicUsize::new(0));
        let service =
            HeartbeatService::new(registry, Duration::from_secs(10), Some(counting_handler(counter.clone())));

        assert_eq!(service.tick_now(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let stats = service.get_heartbeat_stats();
        assert_eq!(stats.total_ticks, 1);
        assert_eq!(stats.sessions_visited, 2);
        assert_eq!(stats.active_sessions, 2);
        assert!(stats.last_sweep_timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_lifecycle() {
        let registry = Arc::new(AgentRegistry::new());
        registry.put(1u64, Arc::new("a".to_string()));

        let counter = Arc::new(AtomicUsize::new(0));
        let service = HeartbeatService::new(
            registry.clone(),
            Duration::from_secs(10),
            Some(counting_handler(counter.clone())),
        );

        assert!(!service.is_running());
        service.start();
        assert!(service.is_running());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        service.stop().await;
        assert!(!service.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = HeartbeatStats {
            total_ticks: 3,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_ticks\":3"));
        assert!(!json.contains("last_sweep_time\""));
    }
}

//! Cluster 게이트
//!
//! 백엔드 프로세스 쪽에서 Hall 링크를 받아 uid 별 사용자 액터로 메시지를 나눕니다.
//!
//! - 액터가 없으면 만들고, 있으면 응답 링크를 최신 링크로 바꿉니다.
//! - 메일박스 투입은 자리가 날 때까지 기다립니다 (프로세스 내부 경로는 손실 없음).
//! - 주기적으로 `retain_time` 동안 접근이 없던 액터를 정리합니다.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClusterGateConfig;
use crate::handler::InboundLink;
use crate::network::{ConnHandler, ConnReader, ServerOptions, TcpConn, TcpServer};
use crate::processor::Processor;
use crate::protocol::Uid;
use crate::service::agent_registry::AgentRegistry;
use crate::service::user_actor::{UserActor, UserSession};
use crate::tool::error::{ClusterError, ClusterResult, ErrorHandler};

type ActorRegistry<P> = AgentRegistry<Uid, UserActor<P>>;

/// Cluster 게이트
pub struct ClusterGate<P>
where
    P: Processor<UserSession<P>>,
{
    config: ClusterGateConfig,
    processor: Arc<P>,
    actors: Arc<ActorRegistry<P>>,
    server: Mutex<Option<Arc<TcpServer>>>,
    sweeper: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl<P> ClusterGate<P>
where
    P: Processor<UserSession<P>>,
{
    pub fn new(config: ClusterGateConfig, processor: Arc<P>) -> Arc<Self> {
        Arc::new(Self {
            config,
            processor,
            actors: Arc::new(AgentRegistry::new()),
            server: Mutex::new(None),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClusterGateConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// 리스너와 유휴 액터 정리를 시작합니다. 실제 바인드된 주소를 반환합니다.
    pub async fn start(self: &Arc<Self>) -> ClusterResult<SocketAddr> {
        if let Err(e) = self.config.validate() {
            ErrorHandler::handle_error(&e, "ClusterGate", "start");
            return Err(e);
        }
        if self.server.lock().is_some() {
            return Err(ClusterError::config("Cluster 게이트가 이미 실행 중입니다"));
        }

        info!("🚀 Cluster 게이트 시작 중... ({})", self.config.tcp_addr);
        let server = TcpServer::bind(ServerOptions::from(&self.config), self.clone()).await?;
        let local_addr = server.local_addr();
        *self.server.lock() = Some(server);

        self.start_sweeper();

        info!("✅ Cluster 게이트가 {}에서 실행 중입니다", local_addr);
        Ok(local_addr)
    }

    fn start_sweeper(&self) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let actors = self.actors.clone();
        let retain_time = self.config.retain_time;
        let period = self.config.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_idle_actors(&actors, retain_time);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("유휴 액터 정리 작업 종료");
        });

        *self.sweeper.lock() = Some((stop_tx, handle));
    }

    /// Hall 링크에서 받은 메시지를 uid 의 액터로 넘깁니다.
    ///
    /// uid 0 은 버립니다. 메일박스가 가득 차면 기다리며, 이때 어떤 락도 잡고 있지 않습니다.
    pub async fn dispatch(&self, uid: Uid, msg: P::Msg, link: &Arc<InboundLink>) {
        if uid == 0 {
            warn!("uid 0 메시지를 버립니다 ({})", link.remote_addr());
            return;
        }

        let mut msg = msg;
        for _ in 0..2 {
            let actor = self.actor_for(uid, link);
            if actor.touch() {
                match actor.send(msg).await {
                    Ok(()) => return,
                    Err(undelivered) => msg = undelivered,
                }
            }
            // 정리와 겹쳐 이미 확정되었거나 멈춘 액터. 제거하고 새 액터로 재시도
            actor.stop();
            self.actors.remove_if_same(&uid, &actor);
        }
        warn!("사용자 액터 투입 실패, 메시지를 버립니다 [uid: {}]", uid);
    }

    fn actor_for(&self, uid: Uid, link: &Arc<InboundLink>) -> Arc<UserActor<P>> {
        let (actor, created) = self.actors.get_or_insert_with(uid, || {
            UserActor::spawn(
                uid,
                link.clone(),
                self.processor.clone(),
                self.config.mailbox_capacity,
            )
        });
        if !created && actor.session().set_link(link) {
            debug!("응답 링크 교체 [uid: {}, 링크: {}]", uid, link.id());
        }
        actor
    }

    /// uid 의 액터
    pub fn actor(&self, uid: Uid) -> Option<Arc<UserActor<P>>> {
        self.actors.get(&uid)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// 유휴 액터를 즉시 정리합니다. 정리된 수를 반환합니다.
    pub fn sweep_idle(&self) -> usize {
        sweep_idle_actors(&self.actors, self.config.retain_time)
    }

    /// uid 의 액터를 명시적으로 정리합니다.
    pub fn remove_actor(&self, uid: Uid) -> bool {
        let Some(actor) = self.actors.get(&uid) else {
            return false;
        };
        let removed = self.actors.remove_if_same(&uid, &actor);
        actor.stop();
        if removed {
            info!("사용자 액터 제거 [uid: {}]", uid);
        }
        removed
    }

    /// 게이트를 닫습니다. 리스너와 모든 액터를 멈춥니다.
    pub async fn close(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some((stop_tx, handle)) = sweeper {
            stop_tx.send_replace(true);
            let _ = handle.await;
        }

        let server = self.server.lock().take();
        if let Some(server) = server {
            server.close().await;
        }

        let actors = self.actors.snapshot();
        self.actors.clear();
        for (_, actor) in actors {
            actor.shutdown().await;
        }
        info!("🛑 Cluster 게이트 종료 완료");
    }
}

/// `retain_time`보다 오래 접근이 없던 액터를 제거하고 멈춥니다.
fn sweep_idle_actors<P>(actors: &ActorRegistry<P>, retain_time: Duration) -> usize
where
    P: Processor<UserSession<P>>,
{
    let now = Instant::now();
    let mut evicted = 0;

    for (uid, actor) in actors.snapshot() {
        if !actor.retire_if_idle(now, retain_time) {
            continue;
        }
        actor.stop();
        if actors.remove_if_same(&uid, &actor) {
            evicted += 1;
            debug!("유휴 사용자 액터 정리 [uid: {}]", uid);
        }
    }

    if evicted > 0 {
        info!("🧹 유휴 사용자 액터 {}개 정리 (남은 액터 {}개)", evicted, actors.len());
    }
    evicted
}

#[async_trait]
impl<P> ConnHandler for ClusterGate<P>
where
    P: Processor<UserSession<P>>,
{
    async fn handle(self: Arc<Self>, conn: Arc<TcpConn>, reader: ConnReader) {
        let link = InboundLink::new(conn);
        link.run(reader, &self).await;
    }
}

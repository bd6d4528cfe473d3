//! Hall ↔ Cluster 루프백 통합 테스트
//!
//! 클라이언트 → Hall → (BackendPool 링크) → Cluster → 사용자 액터 → Hall → 클라이언트

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use cluster::protocol::{split_server_type, LOCAL_SERVER_TYPE};
use cluster::{
    BackendPool, ByteOrder, ClusterError, ClusterGate, ClusterGateConfig, ClusterResult,
    ConnReader, DialerConfig, FrameConfig, HallGate, HallGateConfig, HallSession, JsonCodec,
    MsgParser, Processor, ServerType, TcpConn, UserSession,
};

const GAME_SERVER_TYPE: ServerType = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum HallMsg {
    Login { uid: u64 },
}

#[derive(Default)]
struct HallProcessor {
    codec: JsonCodec<HallMsg>,
}

#[async_trait]
impl Processor<HallSession<HallProcessor>> for HallProcessor {
    type Msg = HallMsg;

    fn marshal(&self, msg: &HallMsg) -> ClusterResult<Vec<Bytes>> {
        self.codec.marshal(msg)
    }

    fn unmarshal(&self, data: &[u8]) -> ClusterResult<HallMsg> {
        self.codec.unmarshal(data)
    }

    async fn route(&self, msg: HallMsg, session: &HallSession<HallProcessor>) -> ClusterResult<()> {
        match msg {
            HallMsg::Login { uid } => {
                session.login(uid)?;
                session.write_msg(&HallMsg::Login { uid })
            }
        }
    }
}

/// 받은 문자열 앞에 uid 를 붙여 돌려주는 게임 프로세서
struct GameProcessor;

#[async_trait]
impl Processor<UserSession<GameProcessor>> for GameProcessor {
    type Msg = String;

    fn marshal(&self, msg: &String) -> ClusterResult<Vec<Bytes>> {
        Ok(vec![Bytes::copy_from_slice(msg.as_bytes())])
    }

    fn unmarshal(&self, data: &[u8]) -> ClusterResult<String> {
        String::from_utf8(data.to_vec()).map_err(|e| ClusterError::protocol(e.to_string()))
    }

    async fn route(&self, msg: String, session: &UserSession<GameProcessor>) -> ClusterResult<()> {
        session.write_msg(&format!("{}:{}", session.uid(), msg))
    }
}

async fn connect_client(addr: std::net::SocketAddr) -> (Arc<TcpConn>, ConnReader) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let parser = Arc::new(MsgParser::new(&FrameConfig::default()));
    TcpConn::new(stream, addr.to_string(), parser, 64)
}

fn send_typed(client: &TcpConn, server_type: ServerType, payload: &[u8]) {
    let header = ByteOrder::LittleEndian.encode_server_type(server_type);
    client.write_msg(&[&header[..], payload]).unwrap();
}

#[tokio::test]
async fn test_client_round_trip_through_cluster() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // Cluster (백엔드) 프로세스
    let cluster_gate = ClusterGate::new(
        ClusterGateConfig {
            tcp_addr: "127.0.0.1:0".to_string(),
            ..ClusterGateConfig::default()
        },
        Arc::new(GameProcessor),
    );
    let cluster_addr = cluster_gate.start().await.unwrap();

    // Hall 프로세스: 백엔드 풀 + Hall 게이트
    let pool = BackendPool::new(DialerConfig {
        connect_interval: Duration::from_millis(20),
        ..DialerConfig::new("")
    });
    pool.add_server(cluster_addr.to_string(), GAME_SERVER_TYPE, 0)
        .unwrap();
    let links = pool.registry();
    for _ in 0..200 {
        if links.find_exact(GAME_SERVER_TYPE, 0).is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(links.find_exact(GAME_SERVER_TYPE, 0).is_ok());

    let hall_gate = Arc::new(HallGate::new(
        HallGateConfig {
            tcp_addr: "127.0.0.1:0".to_string(),
            heartbeat_interval: None,
            ..HallGateConfig::default()
        },
        Arc::new(HallProcessor::default()),
        links,
    ));
    let hall_addr = hall_gate.start().await.unwrap();

    // 클라이언트 로그인 (Hall 에서 직접 처리)
    let (client, mut reader) = connect_client(hall_addr).await;
    let login = serde_json::to_vec(&HallMsg::Login { uid: 77 }).unwrap();
    send_typed(&client, LOCAL_SERVER_TYPE, &login);
    let reply: HallMsg = serde_json::from_slice(&reader.read_msg().await.unwrap()).unwrap();
    assert_eq!(reply, HallMsg::Login { uid: 77 });
    assert!(hall_gate.find_session(77).is_some());

    // 게임 서버로 전달되고 응답은 타입 태그를 붙여 돌아옴
    for text in ["one", "two", "three"] {
        send_typed(&client, GAME_SERVER_TYPE, text.as_bytes());
    }
    for text in ["one", "two", "three"] {
        let frame = tokio::time::timeout(Duration::from_secs(5), reader.read_msg())
            .await
            .unwrap()
            .unwrap();
        let (server_type, payload) = split_server_type(ByteOrder::LittleEndian, frame).unwrap();
        assert_eq!(server_type, GAME_SERVER_TYPE);
        assert_eq!(payload, Bytes::from(format!("77:{}", text)));
    }
    assert_eq!(cluster_gate.actor_count(), 1);

    // 클라이언트 종료 → 세션 정리
    client.close();
    for _ in 0..200 {
        if hall_gate.find_session(77).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(hall_gate.find_session(77).is_none());

    hall_gate.close().await;
    pool.close().await;
    cluster_gate.close().await;
    assert_eq!(cluster_gate.actor_count(), 0);
}

#[tokio::test]
async fn test_unknown_backend_type_closes_client() {
    let pool = BackendPool::new(DialerConfig::new(""));
    let hall_gate = Arc::new(HallGate::new(
        HallGateConfig {
            tcp_addr: "127.0.0.1:0".to_string(),
            heartbeat_interval: None,
            ..HallGateConfig::default()
        },
        Arc::new(HallProcessor::default()),
        pool.registry(),
    ));
    let hall_addr = hall_gate.start().await.unwrap();

    let (client, mut reader) = connect_client(hall_addr).await;
    let login = serde_json::to_vec(&HallMsg::Login { uid: 5 }).unwrap();
    send_typed(&client, LOCAL_SERVER_TYPE, &login);
    reader.read_msg().await.unwrap();

    send_typed(&client, 9, b"nobody home");
    let result = tokio::time::timeout(Duration::from_secs(5), reader.read_msg())
        .await
        .unwrap();
    assert!(result.is_err());

    hall_gate.close().await;
}

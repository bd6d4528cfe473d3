//! 게임 서버 메시지 프로토콜
//!
//! Hall 이 서버 타입 1 로 전달한 사용자 메시지를 처리합니다.
//! 같은 uid 의 메시지는 사용자 액터 하나가 순서대로 처리합니다.
//! 사용자별 상태는 세션의 `user_data`에 두어 액터가 정리될 때 함께 사라집니다.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use cluster::{ClusterError, ClusterResult, JsonCodec, Processor, Uid, UserSession};

/// 게임 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameMessage {
    /// 에코 요청
    Echo { text: String },
    /// 에코 응답
    EchoReply { uid: Uid, text: String },
    /// 채팅 전송
    Chat { text: String },
    /// 채팅 수신 확인 (사용자별 일련번호)
    ChatAck { seq: u64 },
}

/// 게임 메시지 처리기
#[derive(Default)]
pub struct GameProcessor {
    codec: JsonCodec<GameMessage>,
}

/// 사용자별 채팅 일련번호
#[derive(Default)]
struct ChatSeq(AtomicU64);

impl GameProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_chat_seq(session: &UserSession<GameProcessor>) -> u64 {
        let seq = session.user_data_or_insert_with(ChatSeq::default);
        seq.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Processor<UserSession<GameProcessor>> for GameProcessor {
    type Msg = GameMessage;

    fn marshal(&self, msg: &GameMessage) -> ClusterResult<Vec<Bytes>> {
        self.codec.marshal(msg)
    }

    fn unmarshal(&self, data: &[u8]) -> ClusterResult<GameMessage> {
        self.codec.unmarshal(data)
    }

    async fn route(
        &self,
        msg: GameMessage,
        session: &UserSession<GameProcessor>,
    ) -> ClusterResult<()> {
        let uid = session.uid();
        match msg {
            GameMessage::Echo { text } => {
                debug!("에코 [uid: {}]", uid);
                session.write_msg(&GameMessage::EchoReply { uid, text })
            }
            GameMessage::Chat { text } => {
                let seq = Self::next_chat_seq(session);
                info!("💬 채팅 [uid: {}, seq: {}]: {}", uid, seq, text);
                session.write_msg(&GameMessage::ChatAck { seq })
            }
            other => Err(ClusterError::protocol(format!(
                "Hall 이 보낼 수 없는 메시지: {:?}",
                other
            ))),
        }
    }
}

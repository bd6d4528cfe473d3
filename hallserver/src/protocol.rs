//! Hall 로컬 메시지 프로토콜
//!
//! 서버 타입 0 으로 들어온 메시지만 여기서 처리합니다. 나머지는 백엔드로 그대로 전달됩니다.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cluster::{ClusterError, ClusterResult, HallSession, JsonCodec, Processor};
use shared::logging::ServiceType;

/// Hall 로컬 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HallMessage {
    /// 로그인 요청
    Login { uid: u64, nickname: String },
    /// 로그인 성공 응답
    LoginOk { uid: u64 },
    /// 클라이언트 하트비트
    Heartbeat { timestamp: i64 },
    /// 하트비트 응답
    Pong { timestamp: i64 },
    /// 에러 응답
    Error { message: String },
}

/// 세션에 붙여 두는 사용자 정보
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub nickname: String,
}

/// Hall 로컬 메시지 처리기
#[derive(Default)]
pub struct HallProcessor {
    codec: JsonCodec<HallMessage>,
}

impl HallProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Processor<HallSession<HallProcessor>> for HallProcessor {
    type Msg = HallMessage;

    fn marshal(&self, msg: &HallMessage) -> ClusterResult<Vec<Bytes>> {
        self.codec.marshal(msg)
    }

    fn unmarshal(&self, data: &[u8]) -> ClusterResult<HallMessage> {
        self.codec.unmarshal(data)
    }

    async fn route(
        &self,
        msg: HallMessage,
        session: &HallSession<HallProcessor>,
    ) -> ClusterResult<()> {
        match msg {
            HallMessage::Login { uid, nickname } => {
                if let Some(previous) = session.login(uid)? {
                    info!("중복 로그인, 이전 연결을 끊습니다 [uid: {}]", uid);
                    previous.kick();
                }
                info!(
                    "[{}] 로그인 [uid: {}, 닉네임: {}]",
                    ServiceType::HallServer.as_str(),
                    uid,
                    nickname
                );
                session.set_user_data(PlayerInfo { nickname });
                session.write_msg(&HallMessage::LoginOk { uid })
            }
            HallMessage::Heartbeat { timestamp } => {
                debug!("하트비트 [uid: {}]", session.uid());
                session.write_msg(&HallMessage::Pong { timestamp })
            }
            other => Err(ClusterError::protocol(format!(
                "클라이언트가 보낼 수 없는 메시지: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_wire_format() {
        let processor = HallProcessor::new();
        let msg = processor
            .unmarshal(br#"{"type":"Login","uid":42,"nickname":"police"}"#)
            .unwrap();
        assert_eq!(
            msg,
            HallMessage::Login {
                uid: 42,
                nickname: "police".to_string()
            }
        );

        let parts = processor.marshal(&HallMessage::LoginOk { uid: 42 }).unwrap();
        assert_eq!(&parts[0][..], br#"{"type":"LoginOk","uid":42}"#);
    }

    #[test]
    fn test_unknown_message_rejected() {
        let processor = HallProcessor::new();
        assert!(matches!(
            processor.unmarshal(br#"{"type":"Teleport"}"#),
            Err(ClusterError::Protocol(_))
        ));
    }
}

//! 클러스터 와이어 프로토콜 정의
//!
//! 두 구간(클라이언트↔Hall, Hall↔Cluster) 모두 길이 헤더가 붙은 프레임을 사용합니다.
//!
//! # 프로토콜 구조
//!
//! **프레임:**
//! ```text
//! [길이 헤더 (1/2/4바이트)][본문]
//! ```
//!
//! **클라이언트 ↔ Hall 본문:**
//! ```text
//! [2바이트 서버 타입][페이로드]    // 서버 타입 0 = Hall 에서 직접 처리
//! ```
//!
//! **Hall ↔ Cluster 본문:**
//! ```text
//! [8바이트 uid][페이로드]          // uid 는 역다중화 용도로만 사용
//! ```
//!
//! 길이 헤더와 uid/타입 헤더의 바이트 순서는 설정(`little_endian`)을 따릅니다.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::config::FrameConfig;
use crate::tool::error::{ClusterError, ClusterResult, FrameError};

/// 사용자 세션 식별자 (0 = 아직 인증되지 않음)
pub type Uid = u64;
/// 백엔드 서버 타입
pub type ServerType = u16;
/// 같은 타입 안에서의 백엔드 서버 ID
pub type ServerId = u16;

/// uid 헤더 길이
pub const UID_LENGTH: usize = 8;
/// 서버 타입 헤더 길이
pub const TYPE_LENGTH: usize = 2;
/// Hall 에서 직접 처리하는 메시지의 서버 타입
pub const LOCAL_SERVER_TYPE: ServerType = 0;

/// 헤더 바이트 순서
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// 설정 플래그에서 바이트 순서를 결정합니다.
    pub fn from_little_endian(little_endian: bool) -> Self {
        if little_endian {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    /// uid 를 8바이트 헤더로 인코딩합니다.
    pub fn encode_uid(self, uid: Uid) -> [u8; UID_LENGTH] {
        match self {
            ByteOrder::LittleEndian => uid.to_le_bytes(),
            ByteOrder::BigEndian => uid.to_be_bytes(),
        }
    }

    /// 본문 앞쪽 8바이트에서 uid 를 읽습니다.
    pub fn decode_uid(self, data: &[u8]) -> ClusterResult<Uid> {
        if data.len() < UID_LENGTH {
            return Err(ClusterError::protocol(format!(
                "uid 헤더보다 짧은 프레임: {}바이트",
                data.len()
            )));
        }
        let mut buf = &data[..UID_LENGTH];
        Ok(match self {
            ByteOrder::LittleEndian => buf.get_u64_le(),
            ByteOrder::BigEndian => buf.get_u64(),
        })
    }

    /// 서버 타입을 2바이트 헤더로 인코딩합니다.
    pub fn encode_server_type(self, server_type: ServerType) -> [u8; TYPE_LENGTH] {
        match self {
            ByteOrder::LittleEndian => server_type.to_le_bytes(),
            ByteOrder::BigEndian => server_type.to_be_bytes(),
        }
    }

    /// 본문 앞쪽 2바이트에서 서버 타입을 읽습니다.
    pub fn decode_server_type(self, data: &[u8]) -> ClusterResult<ServerType> {
        if data.len() < TYPE_LENGTH {
            return Err(ClusterError::protocol(format!(
                "타입 헤더보다 짧은 프레임: {}바이트",
                data.len()
            )));
        }
        let mut buf = &data[..TYPE_LENGTH];
        Ok(match self {
            ByteOrder::LittleEndian => buf.get_u16_le(),
            ByteOrder::BigEndian => buf.get_u16(),
        })
    }
}

/// `[uid][payload]` 본문을 uid 와 페이로드로 분리합니다.
pub fn split_uid(order: ByteOrder, data: Bytes) -> ClusterResult<(Uid, Bytes)> {
    let uid = order.decode_uid(&data)?;
    Ok((uid, data.slice(UID_LENGTH..)))
}

/// `[serverType][payload]` 본문을 서버 타입과 페이로드로 분리합니다.
pub fn split_server_type(order: ByteOrder, data: Bytes) -> ClusterResult<(ServerType, Bytes)> {
    let server_type = order.decode_server_type(&data)?;
    Ok((server_type, data.slice(TYPE_LENGTH..)))
}

/// 길이 헤더 기반 프레임 파서
///
/// 길이 필드 폭(1/2/4바이트), 최소/최대 본문 길이, 바이트 순서를 설정할 수 있습니다.
/// 최대 길이는 길이 필드가 표현할 수 있는 값으로 잘립니다.
#[derive(Debug, Clone)]
pub struct MsgParser {
    len_msg_len: usize,
    min_msg_len: u32,
    max_msg_len: u32,
    byte_order: ByteOrder,
}

impl MsgParser {
    /// 설정에서 파서를 생성합니다.
    pub fn new(config: &FrameConfig) -> Self {
        let len_msg_len = match config.len_msg_len {
            1 | 2 | 4 => config.len_msg_len,
            invalid => {
                warn!("잘못된 길이 헤더 크기 {}, 2바이트로 재설정", invalid);
                2
            }
        };

        let limit = match len_msg_len {
            1 => u8::MAX as u32,
            2 => u16::MAX as u32,
            _ => u32::MAX,
        };

        Self {
            len_msg_len,
            min_msg_len: config.min_msg_len.min(limit),
            max_msg_len: config.max_msg_len.min(limit),
            byte_order: ByteOrder::from_little_endian(config.little_endian),
        }
    }

    /// 헤더 바이트 순서
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// 허용되는 최대 본문 길이
    pub fn max_msg_len(&self) -> u32 {
        self.max_msg_len
    }

    fn check_len(&self, len: usize) -> Result<(), FrameError> {
        if len > self.max_msg_len as usize {
            return Err(FrameError::TooLong {
                len,
                max: self.max_msg_len,
            });
        }
        if len < self.min_msg_len as usize {
            return Err(FrameError::TooShort {
                len,
                min: self.min_msg_len,
            });
        }
        Ok(())
    }

    /// 스트림에서 프레임 하나를 읽어 본문을 반환합니다.
    pub async fn read_msg<R>(&self, reader: &mut R) -> ClusterResult<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        let header = &mut header[..self.len_msg_len];
        reader.read_exact(header).await?;

        let mut buf = &header[..];
        let len = match (self.len_msg_len, self.byte_order) {
            (1, _) => buf.get_u8() as usize,
            (2, ByteOrder::LittleEndian) => buf.get_u16_le() as usize,
            (2, ByteOrder::BigEndian) => buf.get_u16() as usize,
            (_, ByteOrder::LittleEndian) => buf.get_u32_le() as usize,
            (_, ByteOrder::BigEndian) => buf.get_u32() as usize,
        };
        self.check_len(len)?;

        let mut body = BytesMut::zeroed(len);
        reader.read_exact(&mut body).await?;
        Ok(body.freeze())
    }

    /// 여러 조각을 하나의 프레임으로 인코딩합니다.
    pub fn encode_msg(&self, parts: &[&[u8]]) -> ClusterResult<Bytes> {
        let len: usize = parts.iter().map(|part| part.len()).sum();
        self.check_len(len)?;

        let mut frame = BytesMut::with_capacity(self.len_msg_len + len);
        match (self.len_msg_len, self.byte_order) {
            (1, _) => frame.put_u8(len as u8),
            (2, ByteOrder::LittleEndian) => frame.put_u16_le(len as u16),
            (2, ByteOrder::BigEndian) => frame.put_u16(len as u16),
            (_, ByteOrder::LittleEndian) => frame.put_u32_le(len as u32),
            (_, ByteOrder::BigEndian) => frame.put_u32(len as u32),
        }
        for part in parts {
            frame.extend_from_slice(part);
        }
        Ok(frame.freeze())
    }

    /// 여러 조각을 하나의 프레임으로 스트림에 씁니다.
    pub async fn write_msg<W>(&self, writer: &mut W, parts: &[&[u8]]) -> ClusterResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode_msg(parts)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(len_msg_len: usize, little_endian: bool) -> MsgParser {
        MsgParser::new(&FrameConfig {
            len_msg_len,
            min_msg_len: 1,
            max_msg_len: 4096,
            little_endian,
        })
    }

    #[test]
    fn test_uid_header_round_trip() {
        for uid in [1u64, 10, 0x0102_0304_0506_0708, u64::MAX] {
            for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                let header = order.encode_uid(uid);
                assert_eq!(order.decode_uid(&header).unwrap(), uid);
            }
        }
    }

    #[test]
    fn test_uid_header_mixed_order_differs() {
        let uid = 0x0102_0304_0506_0708u64;
        let header = ByteOrder::LittleEndian.encode_uid(uid);
        assert_ne!(ByteOrder::BigEndian.decode_uid(&header).unwrap(), uid);
    }

    #[test]
    fn test_undersized_headers_rejected() {
        assert!(ByteOrder::LittleEndian.decode_uid(&[1, 2, 3]).is_err());
        assert!(ByteOrder::BigEndian.decode_server_type(&[1]).is_err());
    }

    #[test]
    fn test_split_server_type() {
        let order = ByteOrder::LittleEndian;
        let mut body = order.encode_server_type(3).to_vec();
        body.extend_from_slice(b"hello");
        let (server_type, payload) = split_server_type(order, Bytes::from(body)).unwrap();
        assert_eq!(server_type, 3);
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn test_max_len_clamped_to_header_width() {
        let parser = MsgParser::new(&FrameConfig {
            len_msg_len: 1,
            min_msg_len: 1,
            max_msg_len: u32::MAX,
            little_endian: true,
        });
        assert_eq!(parser.max_msg_len(), 255);
    }

    #[test]
    fn test_encode_rejects_length_violations() {
        let parser = parser(2, true);
        assert!(matches!(
            parser.encode_msg(&[]),
            Err(ClusterError::Frame(FrameError::TooShort { .. }))
        ));
        let big = vec![0u8; 5000];
        assert!(matches!(
            parser.encode_msg(&[big.as_slice()]),
            Err(ClusterError::Frame(FrameError::TooLong { .. }))
        ));
    }

    #[tokio::test]
    async fn test_multi_part_frame_over_stream() {
        let parser = parser(4, false);
        let (mut client, mut server) = tokio::io::duplex(1024);

        parser
            .write_msg(&mut client, &[&b"ab"[..], &b"cde"[..]])
            .await
            .unwrap();
        let body = parser.read_msg(&mut server).await.unwrap();
        assert_eq!(&body[..], b"abcde");
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_frame() {
        let parser = parser(2, true);
        let (mut client, mut server) = tokio::io::duplex(64);

        // 길이 헤더만 5000 으로 보냄
        client.write_all(&5000u16.to_le_bytes()).await.unwrap();
        let result = parser.read_msg(&mut server).await;
        assert!(matches!(result, Err(ClusterError::Frame(_))));
    }

    #[tokio::test]
    async fn test_read_across_partial_segments() {
        let parser = parser(2, true);
        // 헤더와 본문이 여러 조각으로 나뉘어 도착
        let mut stream = tokio_test::io::Builder::new()
            .read(&[5])
            .read(&[0, b'h', b'e'])
            .read(b"llo")
            .build();

        let body = parser.read_msg(&mut stream).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_eof_mid_frame_is_transport_error() {
        let parser = parser(2, true);
        let mut stream = tokio_test::io::Builder::new().read(&[4, 0, b'a']).build();

        let result = parser.read_msg(&mut stream).await;
        assert!(matches!(result, Err(ClusterError::Transport(_))));
    }
}

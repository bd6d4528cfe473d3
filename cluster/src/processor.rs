//! 메시지 프로세서 계약
//!
//! 라우팅 계층은 메시지 내용을 해석하지 않습니다. 직렬화와 라우팅은
//! `Processor` 구현체가 담당합니다.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

use crate::tool::error::ClusterResult;

/// 코덱 + 디스패처
///
/// `S`는 메시지를 받는 세션 타입입니다 (Hall 쪽은 `HallSession`, Cluster 쪽은 `UserSession`).
#[async_trait]
pub trait Processor<S>: Send + Sync + 'static {
    /// 처리하는 메시지 타입
    type Msg: Send + 'static;

    /// 메시지를 프레임 조각들로 직렬화합니다.
    fn marshal(&self, msg: &Self::Msg) -> ClusterResult<Vec<Bytes>>;

    /// 본문을 메시지로 역직렬화합니다.
    fn unmarshal(&self, data: &[u8]) -> ClusterResult<Self::Msg>;

    /// 메시지를 세션에 대해 처리합니다.
    async fn route(&self, msg: Self::Msg, session: &S) -> ClusterResult<()>;
}

/// serde_json 기반 메시지 코덱
///
/// `Processor` 구현체에서 marshal/unmarshal 을 위임하는 용도입니다.
#[derive(Debug)]
pub struct JsonCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> JsonCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 메시지를 JSON 한 조각으로 직렬화
    pub fn marshal(&self, msg: &M) -> ClusterResult<Vec<Bytes>> {
        Ok(vec![Bytes::from(serde_json::to_vec(msg)?)])
    }

    /// JSON 본문을 메시지로 역직렬화
    pub fn unmarshal(&self, data: &[u8]) -> ClusterResult<M> {
        Ok(serde_json::from_slice(data)?)
    }
}

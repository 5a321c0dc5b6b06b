//! 隔离事件存储协议（PoisonEventStore）
//!
//! 以 `(topic, partition, offset)` 为主键的持久表：失败时插入、成功时删除，
//! 并按主题计数/读取以执行容量约束与重放。存储引擎由上层提供实现并注入。
//!
use crate::error::SubscriptionResult as Result;
use crate::event::{EventHeader, EventKey, RawRecord, StreamId, TopicPartitionOffset};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// 一次已确定的失败：位置 + 原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccuredFailure {
    pub position: TopicPartitionOffset,
    pub reason: String,
}

impl OccuredFailure {
    pub fn new(position: TopicPartitionOffset, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

/// 进入隔离区时抓取的完整快照
///
/// 入库时实时批次的内存可能已被回收，因此原始 key/value/时间戳/头部须在此刻保存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningPoisonEvent {
    pub position: TopicPartitionOffset,
    /// 解码后的逻辑键（用于子流查询）
    pub key: EventKey,
    pub raw_key: Vec<u8>,
    pub raw_value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub headers: Vec<EventHeader>,
    pub reason: String,
}

impl OpeningPoisonEvent {
    pub fn from_record(key: EventKey, record: RawRecord, reason: impl Into<String>) -> Self {
        Self {
            position: record.position().clone(),
            key,
            raw_key: record.key().to_vec(),
            raw_value: record.value().to_vec(),
            timestamp: record.timestamp(),
            headers: record.headers().to_vec(),
            reason: reason.into(),
        }
    }
}

/// 存储中的一行隔离记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoisonEvent {
    pub event: OpeningPoisonEvent,
    pub stored_at: DateTime<Utc>,
    pub last_failure_at: DateTime<Utc>,
    /// 最近一次失败原因（初次隔离时等于 `event.reason`）
    pub last_failure_reason: String,
    pub failure_count: u32,
}

impl StoredPoisonEvent {
    pub fn position(&self) -> &TopicPartitionOffset {
        &self.event.position
    }

    pub fn stream_id(&self) -> StreamId {
        StreamId::new(self.event.position.topic.clone(), self.event.key)
    }

    /// 还原为原始记录，供重放反序列化
    pub fn to_record(&self) -> RawRecord {
        RawRecord::builder()
            .position(self.event.position.clone())
            .key(self.event.raw_key.clone())
            .value(self.event.raw_value.clone())
            .timestamp(self.event.timestamp)
            .headers(self.event.headers.clone())
            .build()
    }
}

#[async_trait]
pub trait PoisonEventStore: Send + Sync {
    /// 插入新隔离事件
    async fn add(&self, stored_at: DateTime<Utc>, events: &[OpeningPoisonEvent]) -> Result<()>;

    /// 记录一次再失败（更新既有行的原因/时间/次数；不存在的行忽略）
    async fn add_failure(&self, occured_at: DateTime<Utc>, failure: &OccuredFailure) -> Result<()> {
        self.add_failures(occured_at, std::slice::from_ref(failure))
            .await
    }

    async fn add_failures(
        &self,
        occured_at: DateTime<Utc>,
        failures: &[OccuredFailure],
    ) -> Result<()>;

    async fn remove(&self, position: &TopicPartitionOffset) -> Result<()> {
        self.remove_many(std::slice::from_ref(position)).await
    }

    async fn remove_many(&self, positions: &[TopicPartitionOffset]) -> Result<()>;

    /// 主题内当前隔离的事件数
    async fn count(&self, topic: &str) -> Result<usize>;

    async fn is_stream_stored(&self, topic: &str, key: EventKey) -> Result<bool>;

    /// 返回给定子流中当前存在隔离记录的子流
    async fn get_stored_streams(
        &self,
        stream_ids: &[StreamId],
    ) -> BoxStream<'static, Result<StreamId>>;

    /// 读取主题下全部隔离记录（按分区、偏移量升序）
    async fn get_events(&self, topic: &str) -> Result<Vec<StoredPoisonEvent>>;
}

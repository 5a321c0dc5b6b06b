//! 已消费事件（Event / LogEvent）
//!
//! `Event` 是框架各组件对事件的最小要求：逻辑键、日志位置与声明的消息类型；
//! `LogEvent` 是面向日志传输的具体实现，持有原始记录与解码后的负载。
//!
use super::record::{EventKey, RawRecord, StreamId, TopicPartitionOffset};
use crate::error::SubscriptionResult;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// 框架内流转的事件
pub trait Event: Clone + Send + Sync + 'static {
    /// 逻辑键（分组/排序身份）
    fn key(&self) -> EventKey;

    /// 日志位置，隔离记录的主键
    fn topic_partition_offset(&self) -> &TopicPartitionOffset;

    /// 声明的消息类型
    fn message_type(&self) -> &str;

    fn topic(&self) -> &str {
        &self.topic_partition_offset().topic
    }

    fn stream_id(&self) -> StreamId {
        StreamId::new(self.topic(), self.key())
    }
}

/// 一条已消费并解码的日志记录（克隆开销为引用计数）
#[derive(Debug, Clone)]
pub struct LogEvent {
    inner: Arc<LogEventInner>,
}

#[derive(Debug)]
struct LogEventInner {
    key: EventKey,
    message_type: String,
    payload: Value,
    record: RawRecord,
}

impl LogEvent {
    pub fn new(
        key: EventKey,
        message_type: impl Into<String>,
        payload: Value,
        record: RawRecord,
    ) -> Self {
        Self {
            inner: Arc::new(LogEventInner {
                key,
                message_type: message_type.into(),
                payload,
                record,
            }),
        }
    }

    pub fn record(&self) -> &RawRecord {
        &self.inner.record
    }

    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    /// 将负载解码为具体消息类型
    pub fn payload_as<T: DeserializeOwned>(&self) -> SubscriptionResult<T> {
        Ok(serde_json::from_value(self.inner.payload.clone())?)
    }
}

impl Event for LogEvent {
    fn key(&self) -> EventKey {
        self.inner.key
    }

    fn topic_partition_offset(&self) -> &TopicPartitionOffset {
        self.inner.record.position()
    }

    fn message_type(&self) -> &str {
        &self.inner.message_type
    }
}

//! 原始记录模型（RawRecord）
//!
//! 日志传输层中一条记录的线上形态：位置、原始 key/value 字节、时间戳与头部。
//! `(topic, partition, offset)` 永久唯一地标识日志中的一个位置。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 事件逻辑键（分组/排序的身份标识）
pub type EventKey = Uuid;

/// 日志位置：主题 + 分区 + 偏移量
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl TopicPartitionOffset {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl fmt::Display for TopicPartitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] @{}", self.topic, self.partition, self.offset)
    }
}

/// 子流标识：同一主题下共享同一 key 的有序事件序列
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub topic: String,
    pub key: EventKey,
}

impl StreamId {
    pub fn new(topic: impl Into<String>, key: EventKey) -> Self {
        Self {
            topic: topic.into(),
            key,
        }
    }
}

/// 记录头
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl EventHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct RawRecord {
    /// 记录在日志中的位置
    position: TopicPartitionOffset,
    /// 原始 key 字节
    #[builder(default)]
    key: Vec<u8>,
    /// 原始 value 字节
    #[builder(default)]
    value: Vec<u8>,
    /// 生产端写入时间
    timestamp: DateTime<Utc>,
    #[builder(default)]
    headers: Vec<EventHeader>,
}

impl RawRecord {
    pub fn position(&self) -> &TopicPartitionOffset {
        &self.position
    }

    pub fn topic(&self) -> &str {
        &self.position.topic
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn headers(&self) -> &[EventHeader] {
        &self.headers
    }

    /// 返回首个名为 `key` 的头部值
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }
}

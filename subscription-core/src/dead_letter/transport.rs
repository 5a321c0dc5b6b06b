//! 精确位点回拉协议（FetchConsumer）
//!
//! 隔离区需要按 `(topic, partition, offset)` 精确取回原始记录：
//! assign → consume 一条 → unassign。该消费者使用派生的消费者组，
//! 从不与实时消费组共享已提交位点。
//!
use crate::error::SubscriptionResult as Result;
use crate::event::{RawRecord, TopicPartitionOffset};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait FetchConsumer: Send {
    /// 将消费位置指派到给定分区位点
    async fn assign(&mut self, position: &TopicPartitionOffset) -> Result<()>;

    /// 消费一条记录，直到有数据或取消
    async fn consume(&mut self, token: &CancellationToken) -> Result<RawRecord>;

    async fn unassign(&mut self) -> Result<()>;
}

/// 以给定消费者组创建回拉消费者
pub trait FetchConsumerFactory: Send + Sync {
    fn create(&self, group_id: &str) -> Result<Box<dyn FetchConsumer>>;
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use subscription_core::dead_letter::{FetchConsumer, FetchConsumerFactory};
use subscription_core::error::{SubscriptionError, SubscriptionResult};
use subscription_core::event::{EventHeader, RawRecord, TopicPartitionOffset};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct LogInner {
    partitions: DashMap<(String, i32), Vec<RawRecord>>,
    appended: Notify,
    groups: DashSet<String>,
}

impl LogInner {
    /// 返回偏移量不小于 `position.offset` 的第一条记录
    fn read(&self, position: &TopicPartitionOffset) -> Option<RawRecord> {
        let partition = self
            .partitions
            .get(&(position.topic.clone(), position.partition))?;
        partition
            .iter()
            .find(|r| r.position().offset >= position.offset)
            .cloned()
    }
}

/// 基于内存的分区日志
/// - 每个 (topic, partition) 独立递增偏移量
/// - 作为 `FetchConsumerFactory` 提供按位点回拉，并记录创建过消费者的消费者组
#[derive(Clone, Default)]
pub struct InMemoryLog {
    inner: Arc<LogInner>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录，返回其位点
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        headers: Vec<EventHeader>,
    ) -> TopicPartitionOffset {
        let position = {
            let mut records = self
                .inner
                .partitions
                .entry((topic.to_string(), partition))
                .or_default();
            let offset = records
                .last()
                .map_or(0, |r| r.position().offset + 1);
            let position = TopicPartitionOffset::new(topic, partition, offset);

            records.push(
                RawRecord::builder()
                    .position(position.clone())
                    .key(key.into())
                    .value(value.into())
                    .timestamp(Utc::now())
                    .headers(headers)
                    .build(),
            );
            position
        };

        self.inner.appended.notify_waiters();
        position
    }

    /// 丢弃分区内偏移量小于 `offset` 的记录（模拟保留期清理）
    pub fn truncate_before(&self, topic: &str, partition: i32, offset: i64) {
        if let Some(mut records) = self.inner.partitions.get_mut(&(topic.to_string(), partition)) {
            records.retain(|r| r.position().offset >= offset);
        }
    }

    /// 读取分区内从 `from` 开始的全部记录
    pub fn records(&self, topic: &str, partition: i32, from: i64) -> Vec<RawRecord> {
        self.inner
            .partitions
            .get(&(topic.to_string(), partition))
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.position().offset >= from)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn consumer_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.inner.groups.iter().map(|g| g.key().clone()).collect();
        groups.sort();
        groups
    }
}

impl FetchConsumerFactory for InMemoryLog {
    fn create(&self, group_id: &str) -> SubscriptionResult<Box<dyn FetchConsumer>> {
        if group_id.is_empty() {
            return Err(SubscriptionError::invalid_config("group id must not be empty"));
        }
        self.inner.groups.insert(group_id.to_string());

        Ok(Box::new(InMemoryFetchConsumer {
            log: self.inner.clone(),
            assigned: None,
        }))
    }
}

struct InMemoryFetchConsumer {
    log: Arc<LogInner>,
    assigned: Option<TopicPartitionOffset>,
}

#[async_trait]
impl FetchConsumer for InMemoryFetchConsumer {
    async fn assign(&mut self, position: &TopicPartitionOffset) -> SubscriptionResult<()> {
        self.assigned = Some(position.clone());
        Ok(())
    }

    async fn consume(&mut self, token: &CancellationToken) -> SubscriptionResult<RawRecord> {
        let Some(position) = self.assigned.clone() else {
            return Err(SubscriptionError::transport("consumer is not assigned"));
        };

        loop {
            let appended = self.log.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(record) = self.log.read(&position) {
                // 下一次消费从其后继位置开始
                self.assigned = Some(TopicPartitionOffset::new(
                    position.topic.clone(),
                    position.partition,
                    record.position().offset + 1,
                ));
                return Ok(record);
            }

            tokio::select! {
                _ = token.cancelled() => return Err(SubscriptionError::Cancelled),
                _ = &mut appended => {}
            }
        }
    }

    async fn unassign(&mut self) -> SubscriptionResult<()> {
        self.assigned = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn offsets_grow_per_partition() {
        let log = InMemoryLog::new();
        assert_eq!(log.append("t", 0, b"k".to_vec(), b"a".to_vec(), Vec::new()).offset, 0);
        assert_eq!(log.append("t", 0, b"k".to_vec(), b"b".to_vec(), Vec::new()).offset, 1);
        assert_eq!(log.append("t", 1, b"k".to_vec(), b"c".to_vec(), Vec::new()).offset, 0);
        assert_eq!(log.records("t", 0, 1).len(), 1);
    }

    #[tokio::test]
    async fn consumer_fetches_exact_offset_and_records_group() {
        let log = InMemoryLog::new();
        log.append("t", 0, b"k".to_vec(), b"a".to_vec(), Vec::new());
        let wanted = log.append("t", 0, b"k".to_vec(), b"b".to_vec(), Vec::new());

        let mut consumer = log.create("g_quarantine").unwrap();
        consumer.assign(&wanted).await.unwrap();
        let record = consumer.consume(&CancellationToken::new()).await.unwrap();
        consumer.unassign().await.unwrap();

        assert_eq!(record.position(), &wanted);
        assert_eq!(record.value(), b"b");
        assert_eq!(log.consumer_groups(), vec!["g_quarantine".to_string()]);
    }

    #[tokio::test]
    async fn truncated_offset_yields_next_record() {
        let log = InMemoryLog::new();
        let first = log.append("t", 0, b"k".to_vec(), b"a".to_vec(), Vec::new());
        log.append("t", 0, b"k".to_vec(), b"b".to_vec(), Vec::new());
        log.truncate_before("t", 0, 1);

        let mut consumer = log.create("g").unwrap();
        consumer.assign(&first).await.unwrap();
        let record = consumer.consume(&CancellationToken::new()).await.unwrap();

        assert_eq!(record.position().offset, 1);
    }

    #[tokio::test]
    async fn consume_waits_for_append_or_cancel() {
        let log = InMemoryLog::new();
        let mut consumer = log.create("g").unwrap();
        consumer
            .assign(&TopicPartitionOffset::new("t", 0, 0))
            .await
            .unwrap();

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append("t", 0, b"k".to_vec(), b"late".to_vec(), Vec::new());
        });
        let record = consumer.consume(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.value(), b"late");

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            consumer.consume(&token).await,
            Err(SubscriptionError::Cancelled)
        ));
    }
}

//! 隔离收件箱（PoisonEventInbox）
//!
//! 实时消费路径的隔离入口：
//! - `add`：逐主题检查隔离容量（每次调用每个主题最多检查一次），超限返回
//!   `QuarantineCapacityExceeded` 且本次调用不写入任何事件；随后按精确位点从传输层
//!   回拉原始记录，抓取完整快照后一次性写入存储；
//! - 回拉使用派生消费者组的独立消费者，assign/consume/unassign 视为临界区串行执行；
//!   取回的记录位置与请求不一致时直接失败（`PositionMismatch`），不做重试；
//! - `contains`/`get_contained_keys`：查询子流是否已被隔离，供实时路径快速跳过。
//!
use super::store::{OpeningPoisonEvent, PoisonEventStore};
use super::transport::{FetchConsumer, FetchConsumerFactory};
use crate::config::{ConsumerSettings, DeadLetterConfig};
use crate::error::{SubscriptionError, SubscriptionResult as Result};
use crate::event::{Event, EventKey, RawRecord, StreamId, TopicPartitionOffset};
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// 一条被判定为隔离的事件及原因
#[derive(Debug, Clone)]
pub struct PoisonEvent<E> {
    pub event: E,
    pub reason: String,
}

impl<E> PoisonEvent<E> {
    pub fn new(event: E, reason: impl Into<String>) -> Self {
        Self {
            event,
            reason: reason.into(),
        }
    }
}

pub struct PoisonEventInbox {
    store: Arc<dyn PoisonEventStore>,
    consumer: Mutex<Box<dyn FetchConsumer>>,
    max_poisoned_events_per_topic: usize,
}

impl PoisonEventInbox {
    pub fn new(
        store: Arc<dyn PoisonEventStore>,
        consumer_factory: &dyn FetchConsumerFactory,
        settings: &ConsumerSettings,
        config: &DeadLetterConfig,
    ) -> Result<Self> {
        settings.validate()?;
        let consumer = consumer_factory.create(&settings.quarantine_group_id())?;

        Ok(Self {
            store,
            consumer: Mutex::new(consumer),
            max_poisoned_events_per_topic: config.max_poisoned_events_per_topic,
        })
    }

    pub async fn add_one<E: Event>(
        &self,
        event: PoisonEvent<E>,
        token: &CancellationToken,
    ) -> Result<()> {
        self.add(std::slice::from_ref(&event), token).await
    }

    pub async fn add<E: Event>(
        &self,
        events: &[PoisonEvent<E>],
        token: &CancellationToken,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut threshold = ThresholdChecker::new(self.max_poisoned_events_per_topic);
        let mut opening = Vec::with_capacity(events.len());

        for poison in events {
            threshold
                .ensure(self.store.as_ref(), poison.event.topic())
                .await?;

            let record = self
                .fetch(poison.event.topic_partition_offset(), token)
                .await?;
            opening.push(OpeningPoisonEvent::from_record(
                poison.event.key(),
                record,
                poison.reason.clone(),
            ));
        }

        self.store.add(Utc::now(), &opening).await?;

        for event in &opening {
            tracing::info!(position = %event.position, reason = %event.reason, "event quarantined");
        }
        Ok(())
    }

    pub async fn contains(&self, topic: &str, key: EventKey) -> Result<bool> {
        self.store.is_stream_stored(topic, key).await
    }

    /// 返回 `keys` 中当前已被隔离的键
    pub async fn get_contained_keys(
        &self,
        topic: &str,
        keys: &[EventKey],
    ) -> Result<HashSet<EventKey>> {
        let stream_ids: Vec<StreamId> = keys
            .iter()
            .map(|k| StreamId::new(topic, *k))
            .collect();

        Ok(self
            .get_stored_streams(&stream_ids)
            .await?
            .into_iter()
            .map(|id| id.key)
            .collect())
    }

    /// 返回给定事件所属子流中已被隔离的部分
    pub async fn get_poison_streams<E: Event>(&self, events: &[E]) -> Result<HashSet<StreamId>> {
        let mut seen = HashSet::new();
        let stream_ids: Vec<StreamId> = events
            .iter()
            .map(|e| e.stream_id())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        self.get_stored_streams(&stream_ids).await
    }

    async fn get_stored_streams(&self, stream_ids: &[StreamId]) -> Result<HashSet<StreamId>> {
        if stream_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut stored = HashSet::new();
        let mut stream = self.store.get_stored_streams(stream_ids).await;
        while let Some(id) = stream.next().await {
            stored.insert(id?);
        }
        Ok(stored)
    }

    async fn fetch(
        &self,
        position: &TopicPartitionOffset,
        token: &CancellationToken,
    ) -> Result<RawRecord> {
        // 同一收件箱的并发调用在此串行
        let mut consumer = self.consumer.lock().await;

        consumer.assign(position).await?;
        let consumed = consumer.consume(token).await;
        let unassigned = consumer.unassign().await;

        let record = consumed?;
        unassigned?;

        if record.position() != position {
            tracing::error!(
                requested = %position,
                actual = %record.position(),
                "consumed record offset doesn't match requested one"
            );
            return Err(SubscriptionError::PositionMismatch {
                requested: position.clone(),
                actual: record.position().clone(),
            });
        }

        Ok(record)
    }
}

/// 单次 `add` 调用内的主题容量检查：每个主题只查询一次存储
struct ThresholdChecker {
    limit: usize,
    checked: HashSet<String>,
}

impl ThresholdChecker {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            checked: HashSet::new(),
        }
    }

    async fn ensure(&mut self, store: &dyn PoisonEventStore, topic: &str) -> Result<()> {
        if self.checked.contains(topic) {
            return Ok(());
        }

        let already_poisoned = store.count(topic).await?;
        if already_poisoned >= self.limit {
            return Err(SubscriptionError::QuarantineCapacityExceeded {
                topic: topic.to_string(),
                limit: self.limit,
            });
        }

        self.checked.insert(topic.to_string());
        Ok(())
    }
}

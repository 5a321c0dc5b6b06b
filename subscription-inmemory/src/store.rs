use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::stream;
use std::collections::HashSet;
use subscription_core::dead_letter::{
    OccuredFailure, OpeningPoisonEvent, PoisonEventStore, StoredPoisonEvent,
};
use subscription_core::error::SubscriptionResult;
use subscription_core::event::{EventKey, StreamId, TopicPartitionOffset};

/// 基于内存的隔离存储
/// - 以位点为主键，重复写入同一位点时保留已有记录
/// - 只适用于单实例部署与测试
#[derive(Default)]
pub struct InMemoryPoisonEventStore {
    rows: DashMap<TopicPartitionOffset, StoredPoisonEvent>,
}

impl InMemoryPoisonEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: &TopicPartitionOffset) -> Option<StoredPoisonEvent> {
        self.rows.get(position).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl PoisonEventStore for InMemoryPoisonEventStore {
    async fn add(
        &self,
        stored_at: DateTime<Utc>,
        events: &[OpeningPoisonEvent],
    ) -> SubscriptionResult<()> {
        for event in events {
            self.rows
                .entry(event.position.clone())
                .or_insert_with(|| StoredPoisonEvent {
                    event: event.clone(),
                    stored_at,
                    last_failure_at: stored_at,
                    last_failure_reason: event.reason.clone(),
                    failure_count: 1,
                });
        }
        Ok(())
    }

    async fn add_failures(
        &self,
        occured_at: DateTime<Utc>,
        failures: &[OccuredFailure],
    ) -> SubscriptionResult<()> {
        for failure in failures {
            if let Some(mut row) = self.rows.get_mut(&failure.position) {
                row.last_failure_at = occured_at;
                row.last_failure_reason = failure.reason.clone();
                row.failure_count = row.failure_count.saturating_add(1);
            }
        }
        Ok(())
    }

    async fn remove_many(&self, positions: &[TopicPartitionOffset]) -> SubscriptionResult<()> {
        for position in positions {
            self.rows.remove(position);
        }
        Ok(())
    }

    async fn count(&self, topic: &str) -> SubscriptionResult<usize> {
        Ok(self.rows.iter().filter(|r| r.key().topic == topic).count())
    }

    async fn is_stream_stored(&self, topic: &str, key: EventKey) -> SubscriptionResult<bool> {
        Ok(self
            .rows
            .iter()
            .any(|r| r.key().topic == topic && r.value().event.key == key))
    }

    async fn get_stored_streams(
        &self,
        stream_ids: &[StreamId],
    ) -> BoxStream<'static, SubscriptionResult<StreamId>> {
        let stored: HashSet<StreamId> = self.rows.iter().map(|r| r.value().stream_id()).collect();
        let found: Vec<SubscriptionResult<StreamId>> = stream_ids
            .iter()
            .filter(|id| stored.contains(*id))
            .cloned()
            .map(Ok)
            .collect();

        Box::pin(stream::iter(found))
    }

    async fn get_events(&self, topic: &str) -> SubscriptionResult<Vec<StoredPoisonEvent>> {
        let mut events: Vec<StoredPoisonEvent> = self
            .rows
            .iter()
            .filter(|r| r.key().topic == topic)
            .map(|r| r.value().clone())
            .collect();
        events.sort_by(|a, b| a.position().cmp(b.position()));
        Ok(events)
    }
}

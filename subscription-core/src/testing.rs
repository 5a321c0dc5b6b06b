//! 单元测试共用的事件与协作方替身
//!
use crate::dead_letter::{OccuredFailure, OpeningPoisonEvent, PoisonEventStore, StoredPoisonEvent};
use crate::error::SubscriptionResult;
use crate::event::{Event, EventKey, StreamId, TopicPartitionOffset};
use crate::observing::EventHandler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use futures_util::stream;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq)]
pub struct TestEvent {
    pub key: EventKey,
    pub position: TopicPartitionOffset,
    pub message_type: &'static str,
}

impl Event for TestEvent {
    fn key(&self) -> EventKey {
        self.key
    }
    fn topic_partition_offset(&self) -> &TopicPartitionOffset {
        &self.position
    }
    fn message_type(&self) -> &str {
        self.message_type
    }
}

pub fn key(n: u128) -> EventKey {
    EventKey::from_u128(n)
}

pub fn ev(key_no: u128, offset: i64) -> TestEvent {
    typed(key_no, offset, "Red")
}

pub fn typed(key_no: u128, offset: i64, message_type: &'static str) -> TestEvent {
    TestEvent {
        key: key(key_no),
        position: TopicPartitionOffset::new("topic", 0, offset),
        message_type,
    }
}

/// 记录每次调用收到的事件；可按偏移量失败或标记
#[derive(Clone, Default)]
pub struct SpyHandler {
    pub calls: Arc<Mutex<Vec<Vec<TestEvent>>>>,
    pub fail_all: bool,
    pub mark_offsets: Vec<i64>,
}

impl SpyHandler {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn marking(offsets: Vec<i64>) -> Self {
        Self {
            mark_offsets: offsets,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<TestEvent>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shared(&self) -> Arc<dyn EventHandler<TestEvent>> {
        Arc::new(self.clone())
    }

    fn record(&self, events: &[TestEvent]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(events.to_vec());
        for e in events {
            if self.mark_offsets.contains(&e.position.offset) {
                crate::dead_letter::mark_poisoned(e, format!("marked {}", e.position.offset))?;
            }
        }
        if self.fail_all {
            anyhow::bail!("handler failed");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<TestEvent> for SpyHandler {
    async fn handle(&self, event: &TestEvent, _token: &CancellationToken) -> anyhow::Result<()> {
        self.record(std::slice::from_ref(event))
    }

    async fn handle_batch(
        &self,
        events: &[TestEvent],
        _token: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.record(events)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Add(Vec<OpeningPoisonEvent>),
    AddFailures(Vec<OccuredFailure>),
    Remove(Vec<TopicPartitionOffset>),
}

/// 只记录写入调用的存储替身；`count`/子流/记录查询返回预设值
#[derive(Clone, Default)]
pub struct SpyStore {
    pub calls: Arc<Mutex<Vec<StoreCall>>>,
    pub count: usize,
    pub stored_streams: Vec<StreamId>,
    pub events: Vec<StoredPoisonEvent>,
}

impl SpyStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoisonEventStore for SpyStore {
    async fn add(
        &self,
        _stored_at: DateTime<Utc>,
        events: &[OpeningPoisonEvent],
    ) -> SubscriptionResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Add(events.to_vec()));
        Ok(())
    }

    async fn add_failures(
        &self,
        _occured_at: DateTime<Utc>,
        failures: &[OccuredFailure],
    ) -> SubscriptionResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::AddFailures(failures.to_vec()));
        Ok(())
    }

    async fn remove_many(&self, positions: &[TopicPartitionOffset]) -> SubscriptionResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Remove(positions.to_vec()));
        Ok(())
    }

    async fn count(&self, _topic: &str) -> SubscriptionResult<usize> {
        Ok(self.count)
    }

    async fn is_stream_stored(&self, topic: &str, key: EventKey) -> SubscriptionResult<bool> {
        Ok(self.stored_streams.contains(&StreamId::new(topic, key)))
    }

    async fn get_stored_streams(
        &self,
        stream_ids: &[StreamId],
    ) -> BoxStream<'static, SubscriptionResult<StreamId>> {
        let found: Vec<_> = stream_ids
            .iter()
            .filter(|id| self.stored_streams.contains(id))
            .cloned()
            .map(Ok)
            .collect();
        Box::pin(stream::iter(found))
    }

    async fn get_events(&self, topic: &str) -> SubscriptionResult<Vec<StoredPoisonEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.position().topic == topic)
            .cloned()
            .collect())
    }
}

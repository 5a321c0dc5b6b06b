//! 重试处理器（RetryingEventHandler）
//!
//! 包装处理管线，把错误与作用域标记转换为持久的隔离失败记录，并在成功时清除旧记录：
//! - 单条：出错或被标记 → 记录一次失败；否则删除该位置的隔离记录（自愈）；
//! - 整批：只有一条事件时，未处理的错误归因于该事件；多条事件时错误不做归因，
//!   原样向上传播且不改动存储，只有被显式标记的事件才会转为失败记录；
//! - 失败记录写入后，删除批内所有未失败事件的隔离记录。
//!
use super::scope::FailureScope;
use super::store::{OccuredFailure, PoisonEventStore};
use crate::event::{Event, TopicPartitionOffset};
use crate::observing::EventHandler;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct RetryingEventHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
    store: Arc<dyn PoisonEventStore>,
}

impl<E: Event> RetryingEventHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>, store: Arc<dyn PoisonEventStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for RetryingEventHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        let position = event.topic_partition_offset();
        let (result, marks) = FailureScope::for_event(event)
            .run(self.inner.handle(event, token))
            .await;

        let failure = match result {
            Err(err) => Some(OccuredFailure::new(position.clone(), format!("{err:#}"))),
            Ok(()) => marks
                .into_iter()
                .next()
                .map(|m| OccuredFailure::new(m.position, m.reason)),
        };

        match failure {
            Some(failure) => {
                tracing::debug!(position = %failure.position, reason = %failure.reason, "event failed again");
                self.store.add_failure(Utc::now(), &failure).await?;
            }
            None => self.store.remove(position).await?,
        }

        Ok(())
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let (result, marks) = FailureScope::for_events(events)
            .run(self.inner.handle_batch(events, token))
            .await;

        let failures: Vec<OccuredFailure> = match result {
            Ok(()) => marks
                .into_iter()
                .map(|m| OccuredFailure::new(m.position, m.reason))
                .collect(),
            Err(err) if events.len() == 1 => vec![OccuredFailure::new(
                events[0].topic_partition_offset().clone(),
                format!("{err:#}"),
            )],
            // 无法归因到具体事件：不改动隔离状态
            Err(err) => return Err(err),
        };

        if !failures.is_empty() {
            self.store.add_failures(Utc::now(), &failures).await?;
        }

        if failures.len() == events.len() {
            return Ok(());
        }

        let still_poisoned: HashSet<&TopicPartitionOffset> =
            failures.iter().map(|f| &f.position).collect();
        let healed: Vec<TopicPartitionOffset> = events
            .iter()
            .map(|e| e.topic_partition_offset())
            .filter(|p| !still_poisoned.contains(p))
            .cloned()
            .collect();

        self.store.remove_many(&healed).await?;
        Ok(())
    }
}

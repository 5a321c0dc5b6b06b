//! 实时隔离处理器（PoisonStreamHandler）
//!
//! 实时消费路径上重试处理器的对应物：
//! - 分发前询问收件箱，属于已隔离子流的事件直接送入隔离区（原因为前驱事件已隔离），
//!   不再交给应用处理，以保持子流内的顺序；
//! - 其余事件在失败标记作用域内分发；被标记的事件、以及单条调用出错的事件送入隔离区；
//! - 多条事件的未标记错误原样传播，不写入任何隔离记录。
//!
use super::inbox::{PoisonEvent, PoisonEventInbox};
use super::scope::FailureScope;
use crate::event::{Event, TopicPartitionOffset};
use crate::observing::EventHandler;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const PREDECESSOR_POISONED_REASON: &str = "predecessor event is poisoned";

pub struct PoisonStreamHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
    inbox: Arc<PoisonEventInbox>,
}

impl<E: Event> PoisonStreamHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>, inbox: Arc<PoisonEventInbox>) -> Self {
        Self { inner, inbox }
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for PoisonStreamHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        if self.inbox.contains(event.topic(), event.key()).await? {
            self.inbox
                .add_one(
                    PoisonEvent::new(event.clone(), PREDECESSOR_POISONED_REASON),
                    token,
                )
                .await?;
            return Ok(());
        }

        let (result, marks) = FailureScope::for_event(event)
            .run(self.inner.handle(event, token))
            .await;

        let reason = match result {
            Err(err) => Some(format!("{err:#}")),
            Ok(()) => marks.into_iter().next().map(|m| m.reason),
        };

        if let Some(reason) = reason {
            self.inbox
                .add_one(PoisonEvent::new(event.clone(), reason), token)
                .await?;
        }
        Ok(())
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let poison_streams = self.inbox.get_poison_streams(events).await?;
        let (blocked, healthy): (Vec<E>, Vec<E>) = events
            .iter()
            .cloned()
            .partition(|e| poison_streams.contains(&e.stream_id()));

        let mut quarantine: Vec<PoisonEvent<E>> = blocked
            .into_iter()
            .map(|e| PoisonEvent::new(e, PREDECESSOR_POISONED_REASON))
            .collect();

        if !healthy.is_empty() {
            let (result, marks) = FailureScope::for_events(&healthy)
                .run(self.inner.handle_batch(&healthy, token))
                .await;

            match result {
                Ok(()) => {
                    let by_position: HashMap<&TopicPartitionOffset, &E> = healthy
                        .iter()
                        .map(|e| (e.topic_partition_offset(), e))
                        .collect();
                    for mark in marks {
                        if let Some(event) = by_position.get(&mark.position) {
                            quarantine.push(PoisonEvent::new((*event).clone(), mark.reason));
                        }
                    }
                }
                Err(err) if healthy.len() == 1 => {
                    quarantine.push(PoisonEvent::new(healthy[0].clone(), format!("{err:#}")));
                }
                Err(err) => return Err(err),
            }
        }

        self.inbox.add(&quarantine, token).await?;
        Ok(())
    }
}

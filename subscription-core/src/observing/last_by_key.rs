//! 按键取最新（SingleTypeLastByKey）
//!
//! 值是幂等快照：批内每个键只保留批次顺序中的最后一次出现，
//! 幸存者保持相对顺序并作为一批交给内层处理器。
//!
use super::handler::EventHandler;
use crate::event::{Event, EventKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct SingleTypeLastByKeyEventHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
}

impl<E: Event> SingleTypeLastByKeyEventHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>) -> Self {
        Self { inner }
    }

    fn last_by_key(events: &[E]) -> Vec<E> {
        let last_index: HashMap<EventKey, usize> = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key(), i))
            .collect();

        events
            .iter()
            .enumerate()
            .filter(|(i, e)| last_index.get(&e.key()) == Some(i))
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for SingleTypeLastByKeyEventHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        self.inner.handle(event, token).await
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        if events.len() <= 1 {
            return self.inner.handle_batch(events, token).await;
        }

        let survivors = Self::last_by_key(events);
        self.inner.handle_batch(&survivors, token).await
    }
}

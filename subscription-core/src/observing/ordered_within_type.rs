//! 类型内有序（OrderedWithinType）
//!
//! 与键内有序相同的保证，但按声明的消息类型拆分：不同类型可自由交错，
//! 每个类型自身的子序列保持原顺序。
//!
use super::handler::EventHandler;
use super::ordered_within_key::group_preserving_order;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct OrderedWithinTypeEventHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
}

impl<E: Event> OrderedWithinTypeEventHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for OrderedWithinTypeEventHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        self.inner.handle(event, token).await
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        for unit in group_preserving_order(events, |e| e.message_type().to_string()) {
            self.inner.handle_batch(&unit, token).await?;
        }
        Ok(())
    }
}

//! 单类型批处理（SingleType）
//!
//! 批次原样透传，一次内层调用。
//!
use super::handler::EventHandler;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct SingleTypeEventHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
}

impl<E: Event> SingleTypeEventHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for SingleTypeEventHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        self.inner.handle(event, token).await
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.inner.handle_batch(events, token).await
    }
}

//! 事件处理器（EventHandler）
//!
//! 处理管线中每一层（排序策略、隔离包装、应用处理器）共用的协议：
//! 逐条处理与整批处理两个入口。
//!
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 事件处理器：处理单条事件或一批事件
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    /// 处理单条事件
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()>;

    /// 处理一批事件（默认逐条处理，遇错即止）
    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        for event in events {
            self.handle(event, token).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<E, T> EventHandler<E> for Arc<T>
where
    E: Event,
    T: EventHandler<E> + ?Sized,
{
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        (**self).handle(event, token).await
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        (**self).handle_batch(events, token).await
    }
}

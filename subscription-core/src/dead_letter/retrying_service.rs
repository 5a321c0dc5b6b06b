//! 主题重试服务（TopicRetryingService）
//!
//! 每个启用隔离的主题一个实例（未启用隔离的订阅配置在构造时被拒绝）：读取该主题当前的隔离记录，还原为原始记录后反序列化，
//! 经由 `retry_pipeline`（排序策略 + `RetryingEventHandler`）重放。
//! 成功的事件由重试处理器从存储中移除，再失败的事件更新失败记录。
//!
use super::store::{OccuredFailure, PoisonEventStore};
use crate::config::SubscriptionConfig;
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::event::{Event, EventDeserializer};
use crate::observing::{EventHandler, retry_pipeline};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 单个主题的一次重试过程
#[async_trait]
pub trait TopicRetrying: Send + Sync {
    fn topic(&self) -> &str;

    async fn retry(&self, token: &CancellationToken) -> anyhow::Result<()>;
}

pub struct TopicRetryingService<E: Event> {
    topic: String,
    store: Arc<dyn PoisonEventStore>,
    deserializer: Arc<dyn EventDeserializer<E>>,
    handler: Arc<dyn EventHandler<E>>,
    /// `None` 时逐条重放
    batch_size: Option<usize>,
}

impl<E: Event> TopicRetryingService<E> {
    pub fn new(
        config: &SubscriptionConfig,
        app: Arc<dyn EventHandler<E>>,
        store: Arc<dyn PoisonEventStore>,
        deserializer: Arc<dyn EventDeserializer<E>>,
    ) -> SubscriptionResult<Self> {
        config.validate()?;
        if !config.dead_letter.enabled {
            return Err(SubscriptionError::invalid_config(format!(
                "dead letter is disabled for topic {}",
                config.topic()
            )));
        }

        Ok(Self {
            topic: config.topic().to_string(),
            handler: retry_pipeline(config, app, store.clone()),
            store,
            deserializer,
            batch_size: config.batch.as_ref().map(|b| b.max_batch_size),
        })
    }
}

#[async_trait]
impl<E: Event> TopicRetrying for TopicRetryingService<E> {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn retry(&self, token: &CancellationToken) -> anyhow::Result<()> {
        let stored = self.store.get_events(&self.topic).await?;
        if stored.is_empty() {
            return Ok(());
        }

        let mut events = Vec::with_capacity(stored.len());
        for poisoned in &stored {
            match self.deserializer.deserialize(poisoned.to_record()) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(
                        position = %poisoned.position(),
                        error = %err,
                        "quarantined event cannot be deserialized"
                    );
                    let failure =
                        OccuredFailure::new(poisoned.position().clone(), err.to_string());
                    self.store.add_failure(Utc::now(), &failure).await?;
                }
            }
        }

        tracing::debug!(topic = %self.topic, events = events.len(), "replaying quarantined events");

        match self.batch_size {
            Some(size) => {
                for chunk in events.chunks(size.max(1)) {
                    if token.is_cancelled() {
                        break;
                    }
                    self.handler.handle_batch(chunk, token).await?;
                }
            }
            None => {
                for event in &events {
                    if token.is_cancelled() {
                        break;
                    }
                    self.handler.handle(event, token).await?;
                }
            }
        }

        Ok(())
    }
}

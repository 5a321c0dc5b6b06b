//! 观察者（EventObserver / BatchEventObserver）
//!
//! 消费循环与处理管线之间的驱动层：
//! - `BatchEventObserver`：每个订阅独占一个 `Buffer`；未知消息类型的事件以 `skipped`
//!   方式占位；后台 worker 依次接收批次，分发非 skipped 事件，成功后按分区提交批内最高位点；
//!   处理失败时停止提交并进入故障状态，错误由 `complete` 返回；
//! - `EventObserver`：逐条处理的对应实现。
//!
use super::buffer::{Batch, BatchStream, Buffer};
use super::handler::EventHandler;
use crate::config::{BatchConfig, SubscriptionConfig};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::event::{Event, TopicPartitionOffset};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 位点提交（底层客户端的提交机制不在本 crate 范围内）
#[async_trait]
pub trait OffsetCommitter: Send + Sync {
    /// 提交已处理完成的位置（每个分区一个，均为该分区已处理的最高位点）
    async fn commit(&self, positions: &[TopicPartitionOffset]) -> SubscriptionResult<()>;
}

/// 已注册的消息类型；`None` 表示全部已知
#[derive(Clone, Debug, Default)]
pub struct KnownMessageTypes(Option<HashSet<String>>);

impl KnownMessageTypes {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(types.into_iter().map(Into::into).collect()))
    }

    pub fn from_config(types: Option<&[String]>) -> Self {
        match types {
            Some(types) => Self::only(types.iter().cloned()),
            None => Self::all(),
        }
    }

    pub fn is_known(&self, message_type: &str) -> bool {
        self.0.as_ref().is_none_or(|t| t.contains(message_type))
    }
}

pub struct BatchEventObserver<E: Event> {
    topic: String,
    buffer: Buffer<E>,
    known_types: KnownMessageTypes,
    faulted: Arc<AtomicBool>,
    worker: JoinHandle<anyhow::Result<()>>,
}

impl<E: Event> BatchEventObserver<E> {
    /// 按订阅配置启动：校验配置，批参数与已知消息类型均取自配置
    pub fn for_subscription(
        config: &SubscriptionConfig,
        handler: Arc<dyn EventHandler<E>>,
        committer: Arc<dyn OffsetCommitter>,
        token: CancellationToken,
    ) -> SubscriptionResult<Self> {
        config.validate()?;
        let Some(batch) = &config.batch else {
            return Err(SubscriptionError::invalid_config(format!(
                "batch processing is not configured for topic {}",
                config.topic()
            )));
        };

        Self::start(
            config.topic(),
            batch,
            KnownMessageTypes::from_config(config.known_message_types.as_deref()),
            handler,
            committer,
            token,
        )
    }

    pub fn start(
        topic: impl Into<String>,
        config: &BatchConfig,
        known_types: KnownMessageTypes,
        handler: Arc<dyn EventHandler<E>>,
        committer: Arc<dyn OffsetCommitter>,
        token: CancellationToken,
    ) -> SubscriptionResult<Self> {
        let topic = topic.into();
        let (buffer, batches) = Buffer::from_config(config)?;
        let faulted = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(Self::drive(
            topic.clone(),
            batches,
            handler,
            committer,
            faulted.clone(),
            token,
        ));

        Ok(Self {
            topic,
            buffer,
            known_types,
            faulted,
            worker,
        })
    }

    /// 接收一条已消费事件；下游饱和时挂起
    pub async fn observe(&self, event: E, token: &CancellationToken) -> SubscriptionResult<()> {
        if self.faulted.load(Ordering::Acquire) {
            return Err(SubscriptionError::invalid_state(format!(
                "observer of topic {} is faulted",
                self.topic
            )));
        }

        let skipped = !self.known_types.is_known(event.message_type());
        self.buffer.add(event, skipped, token).await
    }

    /// 刷出剩余事件并等待全部批次处理完成，返回处理过程中的首个错误
    pub async fn complete(self) -> anyhow::Result<()> {
        self.buffer.complete().await?;
        match self.worker.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::anyhow!("batch worker aborted: {join_err}")),
        }
    }

    async fn drive(
        topic: String,
        mut batches: BatchStream<E>,
        handler: Arc<dyn EventHandler<E>>,
        committer: Arc<dyn OffsetCommitter>,
        faulted: Arc<AtomicBool>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            let batch = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                next = batches.next() => match next {
                    Some(batch) => batch,
                    None => return Ok(()),
                },
            };

            let events: Vec<E> = batch.handled_events().cloned().collect();
            if !events.is_empty() {
                if let Err(err) = handler.handle_batch(&events, &token).await {
                    tracing::error!(topic = %topic, error = %err, "batch handling failed");
                    faulted.store(true, Ordering::Release);
                    return Err(err);
                }
            }

            // skipped 事件同样推进位点，保持位点连续
            if let Err(err) = committer.commit(&highest_positions(&batch)).await {
                faulted.store(true, Ordering::Release);
                return Err(err.into());
            }
        }
    }
}

/// 逐条处理的观察者
pub struct EventObserver<E: Event> {
    known_types: KnownMessageTypes,
    handler: Arc<dyn EventHandler<E>>,
    committer: Arc<dyn OffsetCommitter>,
}

impl<E: Event> EventObserver<E> {
    pub fn new(
        known_types: KnownMessageTypes,
        handler: Arc<dyn EventHandler<E>>,
        committer: Arc<dyn OffsetCommitter>,
    ) -> Self {
        Self {
            known_types,
            handler,
            committer,
        }
    }

    pub fn for_subscription(
        config: &SubscriptionConfig,
        handler: Arc<dyn EventHandler<E>>,
        committer: Arc<dyn OffsetCommitter>,
    ) -> SubscriptionResult<Self> {
        config.validate()?;
        Ok(Self::new(
            KnownMessageTypes::from_config(config.known_message_types.as_deref()),
            handler,
            committer,
        ))
    }

    pub async fn observe(&self, event: E, token: &CancellationToken) -> anyhow::Result<()> {
        if self.known_types.is_known(event.message_type()) {
            self.handler.handle(&event, token).await?;
        }
        self.committer
            .commit(std::slice::from_ref(event.topic_partition_offset()))
            .await?;
        Ok(())
    }
}

fn highest_positions<E: Event>(batch: &Batch<E>) -> Vec<TopicPartitionOffset> {
    let mut highest: BTreeMap<(&str, i32), i64> = BTreeMap::new();
    for buffered in batch.events() {
        let p = buffered.event.topic_partition_offset();
        let entry = highest.entry((p.topic.as_str(), p.partition)).or_insert(p.offset);
        *entry = (*entry).max(p.offset);
    }

    highest
        .into_iter()
        .map(|((topic, partition), offset)| TopicPartitionOffset::new(topic, partition, offset))
        .collect()
}

//! 订阅配置（config）
//!
//! 批处理、隔离区与重试宿主的配置项，均提供默认值并可通过 serde 反序列化；
//! 组合为 `SubscriptionConfig` 后在装配时一次性校验。
//!
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::observing::BatchHandlingStrategy;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 隔离消费者组的后缀：与实时消费组的已提交位点完全隔离
pub const QUARANTINE_GROUP_SUFFIX: &str = "_quarantine";

/// 日志传输连接信息（客户端构造本身不在本 crate 范围内）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

impl ConsumerSettings {
    pub fn new(
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topic: topic.into(),
        }
    }

    pub fn validate(&self) -> SubscriptionResult<()> {
        if self.brokers.trim().is_empty() {
            return Err(SubscriptionError::invalid_config("brokers are not specified"));
        }
        if self.group_id.trim().is_empty() {
            return Err(SubscriptionError::invalid_config("group id is not specified"));
        }
        Ok(())
    }

    /// 隔离区回拉原始记录所用的派生消费者组
    pub fn quarantine_group_id(&self) -> String {
        format!("{}{}", self.group_id, QUARANTINE_GROUP_SUFFIX)
    }
}

/// 批处理配置
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 单批最大事件数
    pub max_batch_size: usize,
    /// 下游通道最多缓冲的事件数（按事件计，而非按批）
    pub max_buffer_size: usize,
    /// 批次自首个事件起的关闭超时；`None` 表示仅按大小触发
    pub batch_trigger_timeout: Option<Duration>,
    pub handling_strategy: BatchHandlingStrategy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_buffer_size: 3000,
            batch_trigger_timeout: Some(Duration::from_secs(1)),
            handling_strategy: BatchHandlingStrategy::SingleType,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> SubscriptionResult<()> {
        if self.max_batch_size == 0 {
            return Err(SubscriptionError::invalid_config(
                "max batch size must be at least 1",
            ));
        }
        if self.max_buffer_size < self.max_batch_size {
            return Err(SubscriptionError::invalid_config(format!(
                "max buffer size {} is less than max batch size {}",
                self.max_buffer_size, self.max_batch_size
            )));
        }
        if self.batch_trigger_timeout == Some(Duration::ZERO) {
            return Err(SubscriptionError::invalid_config(
                "batch trigger timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// 隔离区（死信）配置
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    pub enabled: bool,
    /// 每个主题允许同时存在的隔离事件上限
    pub max_poisoned_events_per_topic: usize,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_poisoned_events_per_topic: 1000,
        }
    }
}

/// 重试宿主配置
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryHostConfig {
    /// 两轮重试之间的间隔
    pub interval: Duration,
    /// 所有进程共享的分布式锁标识
    pub lock_id: i64,
}

impl Default for RetryHostConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lock_id: 1,
        }
    }
}

/// 单个主题订阅的完整配置
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub settings: ConsumerSettings,
    /// 为 `None` 时逐条处理
    pub batch: Option<BatchConfig>,
    #[builder(default)]
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    /// 已注册处理器的消息类型；为 `None` 时全部视为已知
    pub known_message_types: Option<Vec<String>>,
}

impl SubscriptionConfig {
    pub fn topic(&self) -> &str {
        &self.settings.topic
    }

    pub fn batch_processing_required(&self) -> bool {
        self.batch.is_some()
    }

    pub fn validate(&self) -> SubscriptionResult<()> {
        self.settings.validate()?;
        if let Some(batch) = &self.batch {
            batch.validate()?;
        }
        if self.dead_letter.enabled && self.dead_letter.max_poisoned_events_per_topic == 0 {
            return Err(SubscriptionError::invalid_config(
                "quarantine capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

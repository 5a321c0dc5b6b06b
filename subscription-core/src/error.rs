//! 订阅框架统一错误定义
//!
//! 覆盖缓冲区状态、配置校验、隔离区容量、传输/存储/锁协作方等最小必要集合，
//! 便于在各实现层统一转换为 `SubscriptionError`。
//!
use crate::event::TopicPartitionOffset;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SubscriptionError {
    // --- 运行状态 ---
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // --- 隔离区（poison events） ---
    #[error("quarantine capacity exceeded: topic={topic}, limit={limit}")]
    QuarantineCapacityExceeded { topic: String, limit: usize },
    #[error("consumed record position mismatch: requested={requested}, actual={actual}")]
    PositionMismatch {
        requested: TopicPartitionOffset,
        actual: TopicPartitionOffset,
    },

    // --- 外部协作方 ---
    #[error("poison event store error: {reason}")]
    Store { reason: String },
    #[error("distributed lock error: {reason}")]
    Lock { reason: String },
    #[error("transport error: {reason}")]
    Transport { reason: String },

    // --- 序列化 ---
    #[error("deserialize error: {reason}")]
    Deserialize { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
}

impl SubscriptionError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// 是否值得在下一轮重试（位置错乱、配置/状态错误与容量超限不可重试）
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::PositionMismatch { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidState { .. }
                | Self::QuarantineCapacityExceeded { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/uuid 等错误转换为 SubscriptionError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for SubscriptionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => SubscriptionError::Store {
                reason: "row not found".to_string(),
            },
            other => SubscriptionError::Store {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for SubscriptionError {
    fn from(err: uuid::Error) -> Self {
        SubscriptionError::Parse {
            reason: err.to_string(),
        }
    }
}

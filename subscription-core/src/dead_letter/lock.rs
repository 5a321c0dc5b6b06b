//! 分布式锁协议（DistributedLock）
//!
//! 跨进程命名互斥的最小能力：阻塞获取（可取消）与幂等释放。
//! 不依赖具体存储引擎，任何满足该约定的原语（包括单实例的内存实现）都可承载。
//!
use crate::error::SubscriptionResult as Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 阻塞直到获得 `lock_id`，取消时返回 `Cancelled` 且不持有锁
    async fn try_enter(&self, lock_id: i64, token: &CancellationToken) -> Result<()>;

    /// 释放 `lock_id`；未持有时为空操作
    async fn exit(&self, lock_id: i64, token: &CancellationToken) -> Result<()>;
}

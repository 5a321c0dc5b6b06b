//! 隔离重试宿主（PoisonEventRetryingHost）
//!
//! 按固定间隔对所有启用隔离的主题执行一轮重试：
//! - 每轮开始前获取分布式锁，保证多实例部署下同一时刻只有一个进程在重放；
//! - 单个主题失败只记录日志，不影响同一轮内的其他主题；
//! - 无论本轮结果如何都释放锁；
//! - 没有任何主题时立即退出。
//!
use super::lock::DistributedLock;
use super::retrying_service::TopicRetrying;
use crate::config::RetryHostConfig;
use crate::error::SubscriptionError;
use bon::Builder;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Builder)]
pub struct PoisonEventRetryingHost {
    services: Vec<Arc<dyn TopicRetrying>>,
    lock: Arc<dyn DistributedLock>,
    #[builder(default)]
    config: RetryHostConfig,
}

impl PoisonEventRetryingHost {
    /// 在后台启动重试循环，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> RetryHostHandle {
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            tokio::spawn(async move { self.run(&token).await })
        };

        RetryHostHandle {
            token,
            task: Some(task),
        }
    }

    /// 运行重试循环直到取消
    pub async fn run(&self, token: &CancellationToken) {
        if self.services.is_empty() {
            tracing::debug!("no topic has quarantine enabled, retry host exits");
            return;
        }

        let lock_id = self.config.lock_id;
        loop {
            match self.lock.try_enter(lock_id, token).await {
                Ok(()) => {
                    self.run_pass(token).await;

                    // 关闭过程中也要释放锁，因此不复用已取消的令牌
                    if let Err(err) = self.lock.exit(lock_id, &CancellationToken::new()).await {
                        tracing::warn!(lock_id, error = %err, "failed to release retry lock");
                    }
                }
                Err(SubscriptionError::Cancelled) => break,
                Err(err) => {
                    tracing::warn!(lock_id, error = %err, "failed to acquire retry lock");
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// 依次重试每个主题
    pub async fn run_pass(&self, token: &CancellationToken) {
        tracing::debug!(topics = self.services.len(), "retry pass started");

        for service in &self.services {
            if token.is_cancelled() {
                return;
            }
            if let Err(err) = service.retry(token).await {
                tracing::error!(topic = %service.topic(), error = %format!("{err:#}"), "topic retry failed");
            }
        }

        tracing::debug!("retry pass finished");
    }
}

/// 重试宿主运行句柄：drop 时自动关闭
pub struct RetryHostHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RetryHostHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RetryHostHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use subscription_core::dead_letter::DistributedLock;
use subscription_core::error::{SubscriptionError, SubscriptionResult};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct LockSlot {
    held: AtomicBool,
    released: Notify,
}

/// 基于内存的命名互斥锁
/// - 同一实例内共享锁的多个宿主之间互斥，可替代单实例部署下的分布式锁
/// - 不记录持有者，`exit` 对未持有的锁为空操作
#[derive(Default)]
pub struct InMemoryDistributedLock {
    slots: DashMap<i64, Arc<LockSlot>>,
}

impl InMemoryDistributedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, lock_id: i64) -> bool {
        self.slots
            .get(&lock_id)
            .is_some_and(|s| s.held.load(Ordering::Acquire))
    }

    fn slot(&self, lock_id: i64) -> Arc<LockSlot> {
        self.slots.entry(lock_id).or_default().clone()
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn try_enter(&self, lock_id: i64, token: &CancellationToken) -> SubscriptionResult<()> {
        let slot = self.slot(lock_id);

        loop {
            if token.is_cancelled() {
                return Err(SubscriptionError::Cancelled);
            }

            // 先登记等待再尝试获取，避免错过两者之间的释放通知
            let released = slot.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if slot
                .held
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }

            tokio::select! {
                _ = token.cancelled() => return Err(SubscriptionError::Cancelled),
                _ = &mut released => {}
            }
        }
    }

    async fn exit(&self, lock_id: i64, _token: &CancellationToken) -> SubscriptionResult<()> {
        let Some(slot) = self.slots.get(&lock_id).map(|s| s.clone()) else {
            return Ok(());
        };

        if slot.held.swap(false, Ordering::AcqRel) {
            slot.released.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_enter_waits_for_exit() {
        let lock = Arc::new(InMemoryDistributedLock::new());
        let token = CancellationToken::new();
        lock.try_enter(1, &token).await.unwrap();

        let waiter = {
            let lock = lock.clone();
            let token = token.clone();
            tokio::spawn(async move { lock.try_enter(1, &token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        lock.exit(1, &token).await.unwrap();
        waiter.await.unwrap().unwrap();
        assert!(lock.is_held(1));
    }

    #[tokio::test]
    async fn cancelled_enter_leaves_lock_untouched() {
        let lock = InMemoryDistributedLock::new();
        let holder = CancellationToken::new();
        lock.try_enter(7, &holder).await.unwrap();

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        assert!(matches!(
            lock.try_enter(7, &token).await,
            Err(SubscriptionError::Cancelled)
        ));
        assert!(lock.is_held(7));
    }

    #[tokio::test]
    async fn exit_is_idempotent_and_ids_are_independent() {
        let lock = InMemoryDistributedLock::new();
        let token = CancellationToken::new();

        lock.exit(3, &token).await.unwrap();
        lock.try_enter(3, &token).await.unwrap();
        lock.try_enter(4, &token).await.unwrap();
        lock.exit(3, &token).await.unwrap();
        lock.exit(3, &token).await.unwrap();

        assert!(!lock.is_held(3));
        assert!(lock.is_held(4));
    }
}

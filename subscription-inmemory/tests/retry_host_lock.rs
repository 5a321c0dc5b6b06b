use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use subscription_core::config::RetryHostConfig;
use subscription_core::dead_letter::{DistributedLock, PoisonEventRetryingHost, TopicRetrying};
use subscription_inmemory::InMemoryDistributedLock;
use tokio_util::sync::CancellationToken;

/// 记录同时处于重试中的宿主数量
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    max_active: AtomicUsize,
    passes: AtomicUsize,
}

struct SlowTopic {
    overlap: Arc<Overlap>,
}

#[async_trait]
impl TopicRetrying for SlowTopic {
    fn topic(&self) -> &str {
        "orders"
    }

    async fn retry(&self, _token: &CancellationToken) -> anyhow::Result<()> {
        let now = self.overlap.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.overlap.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;

        self.overlap.active.fetch_sub(1, Ordering::SeqCst);
        self.overlap.passes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn host(lock: Arc<InMemoryDistributedLock>, overlap: Arc<Overlap>) -> Arc<PoisonEventRetryingHost> {
    let services: Vec<Arc<dyn TopicRetrying>> = vec![Arc::new(SlowTopic { overlap })];
    Arc::new(
        PoisonEventRetryingHost::builder()
            .services(services)
            .lock(lock)
            .config(RetryHostConfig {
                interval: Duration::from_millis(10),
                ..Default::default()
            })
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn two_hosts_never_retry_concurrently() {
    let lock = Arc::new(InMemoryDistributedLock::new());
    let overlap = Arc::new(Overlap::default());

    let first = host(lock.clone(), overlap.clone()).start();
    let second = host(lock.clone(), overlap.clone()).start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    first.shutdown();
    second.shutdown();
    first.join().await;
    second.join().await;

    assert_eq!(overlap.max_active.load(Ordering::SeqCst), 1);
    assert!(overlap.passes.load(Ordering::SeqCst) >= 4);
    assert!(!lock.is_held(RetryHostConfig::default().lock_id));
}

#[tokio::test]
async fn shutdown_while_waiting_for_lock_does_not_hold_it() {
    let lock = Arc::new(InMemoryDistributedLock::new());
    let lock_id = RetryHostConfig::default().lock_id;
    let outsider = CancellationToken::new();
    lock.try_enter(lock_id, &outsider).await.unwrap();

    let overlap = Arc::new(Overlap::default());
    let handle = host(lock.clone(), overlap.clone()).start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.shutdown();
    handle.join().await;

    assert_eq!(overlap.passes.load(Ordering::SeqCst), 0);

    // 宿主退出后锁仍归外部持有者，释放后可再次获取
    lock.exit(lock_id, &outsider).await.unwrap();
    lock.try_enter(lock_id, &outsider).await.unwrap();
}

//! 批次缓冲区（Buffer）
//!
//! 将逐条到达的事件按“大小/超时先到者”组装为批次，并推送至下游：
//! - 批次满 `max_batch_size` 即关闭，同时取消该批次的计时器；
//! - 批次首个事件到达时启动计时器，超时后关闭（每个批次都拥有完整的超时窗口）；
//! - 下游容量按“已缓冲事件数”计量，超出时 `add` 挂起直到消费方释放批次或取消；
//! - `complete` 刷出未满批次并关闭下游，此后的 `add` 返回 `InvalidState`。
//!
//! 当前打开批次的状态只由一个互斥锁持有，计时器任务与 `add/complete` 都经由它串行化，
//! 用代际号保证每个批次恰好被关闭一次。
//!
use crate::config::BatchConfig;
use crate::error::{SubscriptionError, SubscriptionResult};
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// 缓冲中的事件：`skipped` 的事件占据批次位置，但不会分发给处理器
#[derive(Debug, Clone)]
pub struct BufferedEvent<T> {
    pub event: T,
    pub skipped: bool,
}

/// 一个已关闭的批次
///
/// 持有其事件所占用的下游容量，drop 时归还；消费方应在处理完成后释放。
#[derive(Debug)]
pub struct Batch<T> {
    events: Vec<BufferedEvent<T>>,
    capacity: Arc<Semaphore>,
}

impl<T> Batch<T> {
    pub fn events(&self) -> &[BufferedEvent<T>] {
        &self.events
    }

    /// 需要分发给处理器的事件（不含 skipped）
    pub fn handled_events(&self) -> impl Iterator<Item = &T> {
        self.events.iter().filter(|e| !e.skipped).map(|e| &e.event)
    }
}

impl<T> Deref for Batch<T> {
    type Target = [BufferedEvent<T>];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl<T> Drop for Batch<T> {
    fn drop(&mut self) {
        self.capacity.add_permits(self.events.len());
    }
}

/// 下游批次流
pub type BatchStream<T> = UnboundedReceiverStream<Batch<T>>;

struct BufferState<T> {
    events: Vec<BufferedEvent<T>>,
    generation: u64,
    timer: Option<AbortHandle>,
    /// 当前批次的超时截止时间
    deadline: Option<Instant>,
    /// `None` 表示已 complete
    target: Option<mpsc::UnboundedSender<Batch<T>>>,
}

impl<T> BufferState<T> {
    fn close_batch(&mut self, capacity: &Arc<Semaphore>) {
        self.generation = self.generation.wrapping_add(1);
        self.deadline = None;
        if self.events.is_empty() {
            return;
        }

        let batch = Batch {
            events: std::mem::take(&mut self.events),
            capacity: capacity.clone(),
        };

        if let Some(target) = &self.target {
            // 接收端已丢弃时批次随错误一起 drop，容量随之归还
            if target.send(batch).is_err() {
                tracing::warn!("batch receiver dropped, batch discarded");
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct Buffer<T> {
    max_batch_size: usize,
    batch_trigger_timeout: Option<Duration>,
    capacity: Arc<Semaphore>,
    state: Arc<Mutex<BufferState<T>>>,
}

impl<T: Send + 'static> Buffer<T> {
    /// 创建缓冲区，返回其自身与下游批次流
    pub fn new(
        max_batch_size: usize,
        batch_trigger_timeout: Option<Duration>,
        max_buffer_size: usize,
    ) -> SubscriptionResult<(Self, BatchStream<T>)> {
        if max_batch_size == 0 {
            return Err(SubscriptionError::invalid_config(
                "max batch size must be at least 1",
            ));
        }
        if max_buffer_size < max_batch_size {
            return Err(SubscriptionError::invalid_config(
                "max buffer size is less than max batch size",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let buffer = Self {
            max_batch_size,
            batch_trigger_timeout: batch_trigger_timeout.filter(|t| !t.is_zero()),
            capacity: Arc::new(Semaphore::new(max_buffer_size)),
            state: Arc::new(Mutex::new(BufferState {
                events: Vec::with_capacity(max_batch_size),
                generation: 0,
                timer: None,
                deadline: None,
                target: Some(tx),
            })),
        };

        Ok((buffer, UnboundedReceiverStream::new(rx)))
    }

    pub fn from_config(config: &BatchConfig) -> SubscriptionResult<(Self, BatchStream<T>)> {
        config.validate()?;
        Self::new(
            config.max_batch_size,
            config.batch_trigger_timeout,
            config.max_buffer_size,
        )
    }

    /// 追加一个事件；下游饱和时挂起，直到容量释放或取消
    pub async fn add(
        &self,
        event: T,
        skipped: bool,
        token: &CancellationToken,
    ) -> SubscriptionResult<()> {
        if self.state.lock().await.target.is_none() {
            return Err(Self::completed());
        }

        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SubscriptionError::Cancelled),
            permit = self.capacity.acquire() => permit.map_err(|_| Self::completed())?,
        };

        let mut state = self.state.lock().await;
        if state.target.is_none() {
            return Err(Self::completed());
        }

        // 计时器与本次 add 同时到期时，已超时的批次不再接收新事件
        if state.deadline.is_some_and(|d| Instant::now() >= d) {
            state.cancel_timer();
            state.close_batch(&self.capacity);
        }

        // 容量由批次在 drop 时归还
        permit.forget();
        state.events.push(BufferedEvent { event, skipped });

        if state.events.len() >= self.max_batch_size {
            state.cancel_timer();
            state.close_batch(&self.capacity);
        } else if state.events.len() == 1 {
            if let Some(timeout) = self.batch_trigger_timeout {
                self.arm_timer(&mut state, timeout);
            }
        }

        Ok(())
    }

    /// 不再接收事件：刷出未满批次并关闭下游
    pub async fn complete(&self) -> SubscriptionResult<()> {
        let mut state = self.state.lock().await;
        if state.target.is_none() {
            return Ok(());
        }

        state.cancel_timer();
        state.close_batch(&self.capacity);
        state.target = None;
        // 唤醒仍在等待容量的 add，使其返回 InvalidState
        self.capacity.close();
        Ok(())
    }

    fn arm_timer(&self, state: &mut BufferState<T>, timeout: Duration) {
        let generation = state.generation;
        let deadline = Instant::now() + timeout;
        state.deadline = Some(deadline);
        let weak: Weak<Mutex<BufferState<T>>> = Arc::downgrade(&self.state);
        let capacity = self.capacity.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut state = state.lock().await;
            // 期间该批次可能已被大小触发或 complete 关闭
            if state.generation == generation {
                state.timer = None;
                state.close_batch(&capacity);
            }
        });

        state.timer = Some(handle.abort_handle());
    }

    fn completed() -> SubscriptionError {
        SubscriptionError::invalid_state("buffer is completed")
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock() {
            state.cancel_timer();
        }
    }
}

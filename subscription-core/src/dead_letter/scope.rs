//! 失败标记作用域（FailureScope）
//!
//! 每次外层处理调用（单条或整批）开启一个作用域；应用逻辑在调用期间可通过
//! [`mark_poisoned`] 将某些事件标记为隔离而无需返回错误。调用结束（无论成功与否）
//! 作用域即被释放，并交出标记的 `(位置, 原因)` 列表；作用域本身不做任何持久化。
//!
//! 作用域经由 tokio task-local 传播，仅在同一任务内可见；处理器内部另行 spawn 的
//! 任务看不到它。
//!
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::event::{Event, TopicPartitionOffset};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

tokio::task_local! {
    static CURRENT_SCOPE: FailureScope;
}

/// 应用逻辑标记的一次隔离
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonMark {
    pub position: TopicPartitionOffset,
    pub reason: String,
}

#[derive(Clone)]
pub struct FailureScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    members: HashSet<TopicPartitionOffset>,
    marks: Mutex<Vec<PoisonMark>>,
}

impl FailureScope {
    pub fn for_event<E: Event>(event: &E) -> Self {
        Self::for_events(std::slice::from_ref(event))
    }

    pub fn for_events<E: Event>(events: &[E]) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                members: events
                    .iter()
                    .map(|e| e.topic_partition_offset().clone())
                    .collect(),
                marks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 在作用域内执行一次处理调用，返回调用结果与期间产生的标记
    pub async fn run<F: Future>(self, fut: F) -> (F::Output, Vec<PoisonMark>) {
        let output = CURRENT_SCOPE.scope(self.clone(), fut).await;
        (output, self.release())
    }

    fn mark(&self, position: &TopicPartitionOffset, reason: String) -> SubscriptionResult<()> {
        if !self.inner.members.contains(position) {
            return Err(SubscriptionError::invalid_state(format!(
                "event {position} is not handled in the current scope"
            )));
        }

        let mut marks = self
            .inner
            .marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // 同一事件重复标记时保留最后一次原因
        match marks.iter_mut().find(|m| &m.position == position) {
            Some(existing) => existing.reason = reason,
            None => marks.push(PoisonMark {
                position: position.clone(),
                reason,
            }),
        }
        Ok(())
    }

    fn release(self) -> Vec<PoisonMark> {
        std::mem::take(
            &mut *self
                .inner
                .marks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

/// 将当前处理调用中的事件标记为隔离
///
/// 不在任何作用域内，或事件不属于当前调用时返回 `InvalidState`。
pub fn mark_poisoned<E: Event>(event: &E, reason: impl Into<String>) -> SubscriptionResult<()> {
    let reason = reason.into();
    CURRENT_SCOPE
        .try_with(|scope| scope.mark(event.topic_partition_offset(), reason))
        .map_err(|_| SubscriptionError::invalid_state("no failure scope is active"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKey, StreamId};

    #[derive(Clone, Debug)]
    struct Ev(TopicPartitionOffset);

    impl Event for Ev {
        fn key(&self) -> EventKey {
            EventKey::nil()
        }
        fn topic_partition_offset(&self) -> &TopicPartitionOffset {
            &self.0
        }
        fn message_type(&self) -> &str {
            "Ev"
        }
    }

    fn ev(offset: i64) -> Ev {
        Ev(TopicPartitionOffset::new("t", 0, offset))
    }

    #[tokio::test]
    async fn marks_are_released_with_the_call_result() {
        let events = vec![ev(1), ev(2), ev(3)];
        let scope = FailureScope::for_events(&events);

        let (out, marks) = scope
            .run(async {
                mark_poisoned(&events[1], "bad amount").unwrap();
                mark_poisoned(&events[1], "still bad").unwrap();
                42
            })
            .await;

        assert_eq!(out, 42);
        assert_eq!(
            marks,
            vec![PoisonMark {
                position: events[1].0.clone(),
                reason: "still bad".into()
            }]
        );
        assert_eq!(events[1].stream_id(), StreamId::new("t", EventKey::nil()));
    }

    #[tokio::test]
    async fn marks_survive_a_failing_call() {
        let event = ev(9);
        let (out, marks) = FailureScope::for_event(&event)
            .run(async {
                mark_poisoned(&event, "first")?;
                Err::<(), SubscriptionError>(SubscriptionError::invalid_state("boom"))
            })
            .await;

        assert!(out.is_err());
        assert_eq!(marks.len(), 1);
    }

    #[tokio::test]
    async fn marking_outside_scope_or_foreign_event_fails() {
        assert!(matches!(
            mark_poisoned(&ev(1), "x"),
            Err(SubscriptionError::InvalidState { .. })
        ));

        let (res, marks) = FailureScope::for_event(&ev(1))
            .run(async { mark_poisoned(&ev(2), "x") })
            .await;
        assert!(res.is_err());
        assert!(marks.is_empty());
    }
}

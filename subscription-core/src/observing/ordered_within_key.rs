//! 键内有序（OrderedWithinKey）
//!
//! 按键拆分批次：每个键的子序列保持原相对顺序，作为独立单元交给内层处理器；
//! 不同键之间没有顺序约束。单元按键在批内首次出现的顺序依次分发，遇错即止。
//!
use super::handler::EventHandler;
use crate::event::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct OrderedWithinKeyEventHandler<E: Event> {
    inner: Arc<dyn EventHandler<E>>,
}

impl<E: Event> OrderedWithinKeyEventHandler<E> {
    pub fn new(inner: Arc<dyn EventHandler<E>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: Event> EventHandler<E> for OrderedWithinKeyEventHandler<E> {
    async fn handle(&self, event: &E, token: &CancellationToken) -> anyhow::Result<()> {
        self.inner.handle(event, token).await
    }

    async fn handle_batch(&self, events: &[E], token: &CancellationToken) -> anyhow::Result<()> {
        for unit in group_preserving_order(events, |e| e.key()) {
            self.inner.handle_batch(&unit, token).await?;
        }
        Ok(())
    }
}

/// 按分组键拆分，组按首次出现排序，组内保持原顺序
pub(crate) fn group_preserving_order<E, K, F>(events: &[E], group_key: F) -> Vec<Vec<E>>
where
    E: Clone,
    K: Eq + Hash,
    F: Fn(&E) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<E>> = Vec::new();

    for event in events {
        let slot = *index.entry(group_key(event)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(event.clone());
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SpyHandler, ev};

    #[tokio::test]
    async fn each_key_keeps_its_relative_order() {
        let events = vec![ev(1, 0), ev(2, 1), ev(1, 2), ev(3, 3), ev(2, 4), ev(1, 5)];
        let spy = SpyHandler::default();
        let handler = OrderedWithinKeyEventHandler::new(spy.shared());

        handler
            .handle_batch(&events, &CancellationToken::new())
            .await
            .unwrap();

        let calls = spy.calls();
        assert_eq!(calls.len(), 3);
        for k in 1..=3u128 {
            let original: Vec<_> = events.iter().filter(|e| e.key == ev(k, 0).key).collect();
            let received: Vec<_> = calls
                .iter()
                .flatten()
                .filter(|e| e.key == ev(k, 0).key)
                .collect();
            assert_eq!(received, original);
        }
        // 每个单元只包含一个键
        assert!(calls.iter().all(|unit| unit.iter().all(|e| e.key == unit[0].key)));
    }

    #[tokio::test]
    async fn stops_at_first_failing_unit() {
        let spy = SpyHandler::failing();
        let handler = OrderedWithinKeyEventHandler::new(spy.shared());

        let result = handler
            .handle_batch(&[ev(1, 0), ev(2, 1)], &CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert_eq!(spy.calls().len(), 1);
    }
}

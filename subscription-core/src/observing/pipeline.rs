//! 处理管线装配
//!
//! 实时路径：排序策略 → `PoisonStreamHandler` → 应用处理器；
//! 重放路径：排序策略 → `RetryingEventHandler` → 应用处理器；
//! `SingleTypeLastByKey` 例外，重试层位于折叠之上，被折叠掉的旧快照随存活事件一起清除。
//! 逐条处理（未配置批处理）时不包裹排序策略。
//!
use super::handler::EventHandler;
use super::strategy::BatchHandlingStrategy;
use crate::config::SubscriptionConfig;
use crate::dead_letter::{
    PoisonEventInbox, PoisonEventStore, PoisonStreamHandler, RetryingEventHandler,
};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::event::Event;
use std::sync::Arc;

/// 实时消费管线；未启用隔离时应用处理器直接位于策略之下
pub fn live_pipeline<E: Event>(
    config: &SubscriptionConfig,
    app: Arc<dyn EventHandler<E>>,
    inbox: Option<Arc<PoisonEventInbox>>,
) -> SubscriptionResult<Arc<dyn EventHandler<E>>> {
    config.validate()?;

    let inner: Arc<dyn EventHandler<E>> = match (config.dead_letter.enabled, inbox) {
        (true, Some(inbox)) => Arc::new(PoisonStreamHandler::new(app, inbox)),
        (true, None) => {
            return Err(SubscriptionError::invalid_config(format!(
                "dead letter is enabled for topic {} but no inbox is provided",
                config.topic()
            )));
        }
        (false, _) => app,
    };

    Ok(with_strategy(config, inner))
}

/// 隔离事件重放管线
pub fn retry_pipeline<E: Event>(
    config: &SubscriptionConfig,
    app: Arc<dyn EventHandler<E>>,
    store: Arc<dyn PoisonEventStore>,
) -> Arc<dyn EventHandler<E>> {
    match config.batch.as_ref().map(|b| b.handling_strategy) {
        Some(strategy @ BatchHandlingStrategy::SingleTypeLastByKey) => {
            Arc::new(RetryingEventHandler::new(strategy.wrap(app), store))
        }
        _ => with_strategy(config, Arc::new(RetryingEventHandler::new(app, store))),
    }
}

fn with_strategy<E: Event>(
    config: &SubscriptionConfig,
    inner: Arc<dyn EventHandler<E>>,
) -> Arc<dyn EventHandler<E>> {
    match &config.batch {
        Some(batch) => batch.handling_strategy.wrap(inner),
        None => inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, ConsumerSettings, DeadLetterConfig};
    use crate::testing::{SpyHandler, SpyStore, StoreCall, ev};
    use tokio_util::sync::CancellationToken;

    fn config(dead_letter: bool) -> SubscriptionConfig {
        with_batch(dead_letter, BatchConfig::default())
    }

    fn with_batch(dead_letter: bool, batch: BatchConfig) -> SubscriptionConfig {
        SubscriptionConfig::builder()
            .settings(ConsumerSettings::new("localhost:9092", "g", "topic"))
            .batch(batch)
            .dead_letter(DeadLetterConfig {
                enabled: dead_letter,
                ..Default::default()
            })
            .build()
    }

    #[test]
    fn enabled_dead_letter_requires_inbox() {
        let result = live_pipeline(&config(true), SpyHandler::default().shared(), None);
        assert!(matches!(result, Err(SubscriptionError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn live_pipeline_without_dead_letter_reaches_application() {
        let spy = SpyHandler::default();
        let pipeline = live_pipeline(&config(false), spy.shared(), None).unwrap();

        pipeline
            .handle_batch(&[ev(1, 0), ev(2, 1)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(spy.calls(), vec![vec![ev(1, 0), ev(2, 1)]]);
    }

    #[tokio::test]
    async fn retry_pipeline_removes_recovered_events() {
        let store = SpyStore::default();
        let pipeline = retry_pipeline(
            &config(true),
            SpyHandler::default().shared(),
            Arc::new(store.clone()),
        );

        pipeline
            .handle_batch(&[ev(1, 0)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![StoreCall::Remove(vec![ev(1, 0).position])]
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = with_batch(
            false,
            BatchConfig {
                max_batch_size: 0,
                ..Default::default()
            },
        );
        let result = live_pipeline(&config, SpyHandler::default().shared(), None);
        assert!(matches!(result, Err(SubscriptionError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn last_by_key_replay_clears_superseded_snapshots() {
        let store = SpyStore::default();
        let app = SpyHandler::default();
        let pipeline = retry_pipeline(
            &with_batch(
                true,
                BatchConfig {
                    handling_strategy: BatchHandlingStrategy::SingleTypeLastByKey,
                    ..Default::default()
                },
            ),
            app.shared(),
            Arc::new(store.clone()),
        );

        pipeline
            .handle_batch(&[ev(1, 0), ev(1, 1), ev(2, 2)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(app.calls(), vec![vec![ev(1, 1), ev(2, 2)]]);
        assert_eq!(
            store.calls(),
            vec![StoreCall::Remove(vec![
                ev(1, 0).position,
                ev(1, 1).position,
                ev(2, 2).position
            ])]
        );
    }

    #[tokio::test]
    async fn last_by_key_replay_keeps_failing_survivor_only() {
        let store = SpyStore::default();
        let pipeline = retry_pipeline(
            &with_batch(
                true,
                BatchConfig {
                    handling_strategy: BatchHandlingStrategy::SingleTypeLastByKey,
                    ..Default::default()
                },
            ),
            SpyHandler::marking(vec![1]).shared(),
            Arc::new(store.clone()),
        );

        pipeline
            .handle_batch(&[ev(1, 0), ev(1, 1)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::AddFailures(vec![crate::dead_letter::OccuredFailure::new(
                    ev(1, 1).position,
                    "marked 1"
                )]),
                StoreCall::Remove(vec![ev(1, 0).position]),
            ]
        );
    }
}

//! 日志订阅框架核心（subscription-core）
//!
//! 面向分区日志（Kafka 风格）消费者的处理框架：
//! - 事件模型（`event`）：原始记录、位点与反序列化；
//! - 批处理（`observing`）：带背压的批次缓冲、四种排序/分组策略、批次驱动与位点提交；
//! - 隔离与重试（`dead_letter`）：失败标记作用域、隔离收件箱、重试处理器与周期重试宿主；
//! - 配置（`config`）与错误（`error`）。
//!
//! 本 crate 只定义协议与编排逻辑，存储、分布式锁与传输客户端由外部实现
//! （内存实现见 `subscription-inmemory`）。
//!
//! 典型用法：
//! 1. 以 `SubscriptionConfig` 描述订阅，`live_pipeline` 组装实时处理管线；
//! 2. 用 `BatchEventObserver` 驱动消费到的事件并提交位点；
//! 3. 为启用隔离的主题创建 `TopicRetryingService`，交给 `PoisonEventRetryingHost` 周期重放。
//!
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod observing;

#[cfg(test)]
mod testing;

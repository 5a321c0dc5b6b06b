//! 订阅框架的内存实现（subscription-inmemory）
//!
//! 为单实例部署与测试提供全部外部协作方：
//! - `InMemoryPoisonEventStore`：隔离存储；
//! - `InMemoryDistributedLock`：命名互斥锁；
//! - `InMemoryLog`：分区日志与按位点回拉的消费者。
//!
mod lock;
mod log;
mod store;

pub use lock::InMemoryDistributedLock;
pub use log::InMemoryLog;
pub use store::InMemoryPoisonEventStore;

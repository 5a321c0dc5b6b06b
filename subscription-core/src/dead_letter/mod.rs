//! 隔离与重试（dead_letter）
//!
//! - `FailureScope`/`mark_poisoned`：处理过程中显式标记隔离事件；
//! - `RetryingEventHandler`/`PoisonStreamHandler`：把错误与标记转换为隔离记录；
//! - `PoisonEventInbox`：实时路径的隔离入口（容量检查、原始记录回拉）；
//! - `TopicRetryingService`/`PoisonEventRetryingHost`：按主题周期重放隔离事件；
//! - `PoisonEventStore`/`DistributedLock`/`FetchConsumer`：外部协作方协议。
//!
mod host;
mod inbox;
mod lock;
mod poison_stream;
mod retrying;
mod retrying_service;
mod scope;
mod store;
mod transport;

pub use host::{PoisonEventRetryingHost, RetryHostHandle};
pub use inbox::{PoisonEvent, PoisonEventInbox};
pub use lock::DistributedLock;
pub use poison_stream::{PREDECESSOR_POISONED_REASON, PoisonStreamHandler};
pub use retrying::RetryingEventHandler;
pub use retrying_service::{TopicRetrying, TopicRetryingService};
pub use scope::{FailureScope, PoisonMark, mark_poisoned};
pub use store::{OccuredFailure, OpeningPoisonEvent, PoisonEventStore, StoredPoisonEvent};
pub use transport::{FetchConsumer, FetchConsumerFactory};

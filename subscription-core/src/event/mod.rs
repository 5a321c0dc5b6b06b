//! 事件模型（event）
//!
//! - `RawRecord`/`TopicPartitionOffset`/`StreamId`：日志位置与线上形态；
//! - `Event`/`LogEvent`：框架内流转的已消费事件；
//! - `EventDeserializer`：原始记录到事件的还原，实时消费与重放共用。
//!
mod deserializer;
mod log_event;
mod record;

pub use deserializer::{EventDeserializer, JsonEventDeserializer, MESSAGE_TYPE_HEADER};
pub use log_event::{Event, LogEvent};
pub use record::{EventHeader, EventKey, RawRecord, StreamId, TopicPartitionOffset};

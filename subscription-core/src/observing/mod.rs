//! 观察与批处理（observing）
//!
//! - `Buffer`：按大小/超时切批，并以事件数为单位施加背压；
//! - 四种排序策略（`BatchHandlingStrategy`）对批次分组后交给内层处理器；
//! - `BatchEventObserver`/`EventObserver`：驱动批次处理并提交位点；
//! - `live_pipeline`/`retry_pipeline`：实时与重放两条处理管线的装配。
//!
mod buffer;
mod handler;
mod last_by_key;
mod observer;
mod ordered_within_key;
mod ordered_within_type;
mod pipeline;
mod single_type;
mod strategy;

pub use buffer::{Batch, BatchStream, Buffer, BufferedEvent};
pub use handler::EventHandler;
pub use last_by_key::SingleTypeLastByKeyEventHandler;
pub use observer::{BatchEventObserver, EventObserver, KnownMessageTypes, OffsetCommitter};
pub use ordered_within_key::OrderedWithinKeyEventHandler;
pub use ordered_within_type::OrderedWithinTypeEventHandler;
pub use pipeline::{live_pipeline, retry_pipeline};
pub use single_type::SingleTypeEventHandler;
pub use strategy::BatchHandlingStrategy;

//! 批处理策略选择（BatchHandlingStrategy）
//!
//! 四种排序/分组策略是一个封闭集合，在装配时按配置一次性选定。
//!
use super::handler::EventHandler;
use super::last_by_key::SingleTypeLastByKeyEventHandler;
use super::ordered_within_key::OrderedWithinKeyEventHandler;
use super::ordered_within_type::OrderedWithinTypeEventHandler;
use super::single_type::SingleTypeEventHandler;
use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchHandlingStrategy {
    #[default]
    SingleType,
    SingleTypeLastByKey,
    OrderedWithinKey,
    OrderedWithinType,
}

impl BatchHandlingStrategy {
    /// 以所选策略包装内层处理器
    pub fn wrap<E: Event>(self, inner: Arc<dyn EventHandler<E>>) -> Arc<dyn EventHandler<E>> {
        match self {
            Self::SingleType => Arc::new(SingleTypeEventHandler::new(inner)),
            Self::SingleTypeLastByKey => Arc::new(SingleTypeLastByKeyEventHandler::new(inner)),
            Self::OrderedWithinKey => Arc::new(OrderedWithinKeyEventHandler::new(inner)),
            Self::OrderedWithinType => Arc::new(OrderedWithinTypeEventHandler::new(inner)),
        }
    }
}

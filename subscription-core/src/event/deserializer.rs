//! 事件反序列化（EventDeserializer）
//!
//! 将原始记录还原为框架事件；实时消费与隔离重放共用同一实现，
//! 以保证重放事件与首次消费时完全一致。
//!
use super::log_event::LogEvent;
use super::record::{EventKey, RawRecord};
use crate::error::{SubscriptionError, SubscriptionResult};

/// 承载消息类型名称的记录头
pub const MESSAGE_TYPE_HEADER: &str = "message-type";

pub trait EventDeserializer<E>: Send + Sync {
    fn deserialize(&self, record: RawRecord) -> SubscriptionResult<E>;
}

/// JSON 负载的反序列化器
///
/// - key：16 字节二进制 UUID，或其文本形式；
/// - 消息类型：取自 `message-type` 头；
/// - value：JSON 文档（空 value 视为 `null`）。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDeserializer;

impl JsonEventDeserializer {
    fn parse_key(bytes: &[u8]) -> SubscriptionResult<EventKey> {
        if bytes.len() == 16 {
            return Ok(EventKey::from_slice(bytes)?);
        }

        let text = std::str::from_utf8(bytes).map_err(|e| SubscriptionError::Deserialize {
            reason: format!("key is neither 16 bytes nor utf-8: {e}"),
        })?;
        Ok(EventKey::parse_str(text.trim())?)
    }
}

impl EventDeserializer<LogEvent> for JsonEventDeserializer {
    fn deserialize(&self, record: RawRecord) -> SubscriptionResult<LogEvent> {
        let key = Self::parse_key(record.key())?;

        let message_type = match record.header(MESSAGE_TYPE_HEADER) {
            Some(raw) => std::str::from_utf8(raw)
                .map_err(|e| SubscriptionError::Deserialize {
                    reason: format!("{MESSAGE_TYPE_HEADER} header is not utf-8: {e}"),
                })?
                .to_string(),
            None => {
                return Err(SubscriptionError::Deserialize {
                    reason: format!(
                        "{MESSAGE_TYPE_HEADER} header is missing at {}",
                        record.position()
                    ),
                });
            }
        };

        let payload = if record.value().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(record.value())?
        };

        Ok(LogEvent::new(key, message_type, payload, record))
    }
}

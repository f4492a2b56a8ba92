use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 投递失败通知
///
/// destination与key对本核心是不透明字符串；payload为原始消息体，
/// 重投时原样发回destination。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNotice {
    pub destination: String,
    pub key: String,
    pub payload: Value,
    pub error_message: String,
}

impl FailureNotice {
    pub fn new<D, K>(destination: D, key: K, payload: Value, error_message: String) -> Self
    where
        D: Into<String>,
        K: Into<String>,
    {
        Self {
            destination: destination.into(),
            key: key.into(),
            payload,
            error_message,
        }
    }

    /// 重试表的条目键
    pub fn entry_key(&self) -> (String, String) {
        (self.destination.clone(), self.key.clone())
    }
}

/// 重试条目状态机
///
/// Pending → Retrying(attempt ∈ [1, MAX]) → Exhausted | Resolved。
/// Exhausted与Resolved为终态，条目随之从重试表清除。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Retrying { attempt: u32 },
    Resolved { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Resolved { .. } | RetryState::Exhausted { .. }
        )
    }
}

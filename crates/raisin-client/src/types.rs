//! 服务调用结果类型

use raisin_network::ServiceReply;
use raisin_protocol::{CallError, ServiceResult};
use serde::de::DeserializeOwned;

/// 带返回值的服务调用结果
///
/// `value` 只在 `result.success` 且响应负载可解码时为 `Some`。
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOutcome<T> {
    pub result: ServiceResult,
    pub value: Option<T>,
}

impl<T> ServiceOutcome<T> {
    pub fn failed(result: ServiceResult) -> Self {
        Self { result, value: None }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }

    pub fn message(&self) -> &str {
        &self.result.message
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// 解码响应并取出所需字段
    ///
    /// 成功但负载无法解码时，结果改为失败（消息说明原因）。
    pub(crate) fn from_reply<R, F>(reply: ServiceReply, extract: F) -> Self
    where
        R: DeserializeOwned,
        F: FnOnce(R) -> T,
    {
        if !reply.success() {
            return Self::failed(reply.result);
        }
        match reply.decode::<R>() {
            Ok(response) => Self {
                result: reply.result,
                value: Some(extract(response)),
            },
            Err(e) => Self::failed(
                CallError::ServiceFailure(format!("invalid response: {}", e)).into(),
            ),
        }
    }
}

impl<T> From<ServiceOutcome<T>> for ServiceResult {
    fn from(outcome: ServiceOutcome<T>) -> Self {
        outcome.result
    }
}

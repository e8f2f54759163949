//! 统一响应 envelope：`{ success, data?, message?, error? }`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EdubillSDKError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 失败时的错误码（`NOT_FOUND` 等）；远端返回的可能是任意 JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), ..Default::default() }
    }

    pub fn ok_with_message(data: Option<Value>, message: impl Into<String>) -> Self {
        Self { success: true, data, message: Some(message.into()), error: None }
    }

    pub fn failure(error: &EdubillSDKError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.to_string()),
            error: Some(Value::String(error.kind().as_str().to_string())),
        }
    }

    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }

    /// 远端 envelope 转为 Result；success=false 视为远端拒绝
    pub fn into_result(self, status: u16) -> Result<Value> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(self.into_rejection(status))
    }

    /// success=false 的 envelope 转为 `Remote` 错误
    pub fn into_rejection(self, status: u16) -> EdubillSDKError {
        let message = self
            .message
            .or_else(|| self.error.as_ref().and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "Request rejected".to_string());
        EdubillSDKError::Remote { status, message }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_carries_kind_and_message() {
        let resp = ApiResponse::from_result(Err(EdubillSDKError::NotFound("User not found".into())));
        assert!(!resp.success);
        assert_eq!(resp.message(), Some("User not found"));
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"success": false, "message": "User not found", "error": "NOT_FOUND"})
        );
    }

    #[test]
    fn remote_envelope_to_result() {
        let body: ApiResponse = serde_json::from_value(json!({"success": true, "data": [1]})).unwrap();
        assert_eq!(body.into_result(200).unwrap(), json!([1]));

        let body: ApiResponse =
            serde_json::from_value(json!({"success": false, "message": "Email taken"})).unwrap();
        match body.into_result(200).unwrap_err() {
            EdubillSDKError::Remote { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "Email taken");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

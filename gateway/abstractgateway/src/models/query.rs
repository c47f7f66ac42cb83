use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One query intent sent on the request subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderRequest {
    pub query_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ReaderRequest {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply to exactly one [`ReaderRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ReaderResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Collapses the response into its meaningful half: `data` on success,
    /// `message` on error.
    pub fn into_result(self) -> Result<Value, String> {
        match self.status {
            ResponseStatus::Success => Ok(self.data.unwrap_or(Value::Null)),
            ResponseStatus::Error => Err(self.message.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = ReaderRequest::new("device_health").param("source_device", "sensor-1");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"query_type": "device_health", "params": {"source_device": "sensor-1"}}));
    }

    #[test]
    fn test_request_without_params() {
        let req: ReaderRequest = serde_json::from_str(r#"{"query_type":"alerts_critical"}"#).unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_response_shapes() {
        let ok: ReaderResponse = serde_json::from_str(r#"{"status":"success","data":{"health":"ok"},"summary":[]}"#).unwrap();
        assert_eq!(ok.clone().into_result(), Ok(json!({"health": "ok"})));

        let err: ReaderResponse = serde_json::from_str(r#"{"status":"error","message":"no data"}"#).unwrap();
        assert_eq!(err.into_result(), Err("no data".to_string()));

        assert_eq!(
            serde_json::to_value(ReaderResponse::error("boom")).unwrap(),
            json!({"status": "error", "message": "boom"})
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(serde_json::from_str::<ReaderResponse>(r#"{"status":"pending"}"#).is_err());
    }
}

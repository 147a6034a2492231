use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MISSING_PARAMETERS_MESSAGE: &str = "missing query parameters";
pub const MALFORMED_BODY_MESSAGE: &str = "malformed request body";
pub const INVALID_FIELD_MESSAGE: &str = "invalid query field";
pub const INVALID_VALUE_MESSAGE: &str = "invalid query value";
pub const NOT_FOUND_MESSAGE: &str = "parameter not found in database";
pub const QUERIES_COMPLETED_MESSAGE: &str = "queries completed";
pub const QUEUE_PROCESSED_MESSAGE: &str = "queue messages processed";
pub const INVALID_EVENT_MESSAGE: &str = "invalid event";
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    /// Parsed `body`, for callers that need to inspect the payload.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

pub fn json_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

pub fn message_response(status_code: u16, message: &str) -> ApiGatewayResponse {
    json_response(status_code, json!({ "message": message }))
}

pub fn internal_error_response(error: &str) -> ApiGatewayResponse {
    json_response(
        500,
        json!({
            "message": INTERNAL_ERROR_MESSAGE,
            "error": error,
        }),
    )
}

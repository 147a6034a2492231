use serde_json::{Map, Value};

/// Shape of an inbound invocation, decided by its top-level keys.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    HttpInvocation(HttpInvocation),
    QueueBatch(QueueBatch),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpInvocation {
    pub http_method: String,
    pub body: Option<Value>,
    pub query_string_parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueBatch {
    pub messages: Vec<QueueMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub body: Option<Value>,
}

impl QueueMessage {
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("unknown")
    }
}

/// A truthy `httpMethod` wins over `Records`; anything that is not an
/// object, or has neither key, is unknown.
pub fn classify(event: Value) -> InboundEvent {
    let Value::Object(mut object) = event else {
        return InboundEvent::Unknown;
    };

    if let Some(method) = object.remove("httpMethod").filter(is_truthy) {
        return InboundEvent::HttpInvocation(HttpInvocation {
            http_method: match method {
                Value::String(name) => name,
                other => other.to_string(),
            },
            body: object.remove("body").filter(|body| !body.is_null()),
            query_string_parameters: match object.remove("queryStringParameters") {
                Some(Value::Object(parameters)) => Some(parameters),
                _ => None,
            },
        });
    }

    if let Some(Value::Array(records)) = object.remove("Records") {
        return InboundEvent::QueueBatch(QueueBatch {
            messages: records.into_iter().map(queue_message).collect(),
        });
    }

    InboundEvent::Unknown
}

/// `null`, `false`, zero and `""` count as absent.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn queue_message(record: Value) -> QueueMessage {
    let Value::Object(mut record) = record else {
        return QueueMessage {
            message_id: None,
            body: None,
        };
    };

    QueueMessage {
        message_id: record
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string),
        body: record.remove("body"),
    }
}

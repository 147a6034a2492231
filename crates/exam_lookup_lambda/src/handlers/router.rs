use std::str::FromStr;

use exam_lookup_core::contract::{
    KeyError, LookupParameters, LookupResult, QUERY_FIELD_PARAM, QUERY_VALUE_PARAM,
};
use exam_lookup_core::lookup::{LookupError, LookupService, RecordStore};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::notification::{NotificationPublisher, PublishError};
use crate::handlers::event::{classify, HttpInvocation, InboundEvent, QueueBatch, QueueMessage};
use crate::handlers::response::{
    json_response, message_response, ApiGatewayResponse, INVALID_EVENT_MESSAGE,
    INVALID_FIELD_MESSAGE, INVALID_VALUE_MESSAGE, MALFORMED_BODY_MESSAGE,
    MISSING_PARAMETERS_MESSAGE, NOT_FOUND_MESSAGE, QUERIES_COMPLETED_MESSAGE,
    QUEUE_PROCESSED_MESSAGE,
};

/// What a queue batch does when a message fails with a query or publish
/// error. Malformed and not-found messages are always skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchFailurePolicy {
    /// Stop at the first hard failure and fail the invocation.
    #[default]
    FailFast,
    /// Log the failure and carry on with the next message.
    Continue,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseBatchFailurePolicyError(pub String);

impl FromStr for BatchFailurePolicy {
    type Err = ParseBatchFailurePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" | "failfast" => Ok(Self::FailFast),
            "continue" => Ok(Self::Continue),
            other => Err(ParseBatchFailurePolicyError(other.to_string())),
        }
    }
}

/// Failures that escape the router and end up at the top-level boundary.
/// Display text never includes the underlying driver or SDK message.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("could not serialize lookup response")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
enum BodyError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body must be a JSON object or a string holding one")]
    Shape,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum MessageOutcome {
    Published,
    Skipped,
}

pub struct EventRouter<S, P> {
    lookup: LookupService<S>,
    publisher: P,
    policy: BatchFailurePolicy,
}

impl<S: RecordStore, P: NotificationPublisher> EventRouter<S, P> {
    pub fn new(lookup: LookupService<S>, publisher: P, policy: BatchFailurePolicy) -> Self {
        Self {
            lookup,
            publisher,
            policy,
        }
    }

    pub fn lookup_service(&self) -> &LookupService<S> {
        &self.lookup
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub async fn route(&self, event: Value) -> Result<ApiGatewayResponse, RouteError> {
        match classify(event) {
            InboundEvent::HttpInvocation(invocation) => self.route_http(invocation).await,
            InboundEvent::QueueBatch(batch) => self.route_batch(batch).await,
            InboundEvent::Unknown => {
                warn!("event has neither httpMethod nor Records");
                Ok(message_response(400, INVALID_EVENT_MESSAGE))
            }
        }
    }

    async fn route_http(
        &self,
        invocation: HttpInvocation,
    ) -> Result<ApiGatewayResponse, RouteError> {
        info!(http_method = %invocation.http_method, "routing http invocation");

        let body = match parse_parameters(invocation.body.as_ref()) {
            Ok(parameters) => parameters,
            Err(error) => {
                warn!(%error, "rejecting http invocation with malformed body");
                return Ok(message_response(400, MALFORMED_BODY_MESSAGE));
            }
        };
        let parameters = body.or(query_string_parameters(
            invocation.query_string_parameters.as_ref(),
        ));

        let key = match parameters.into_key() {
            Ok(key) => key,
            Err(error) => {
                warn!(%error, "rejecting http invocation");
                return Ok(key_error_response(&error));
            }
        };
        info!(field = %key.field, value = %key.value, "lookup parameters resolved");

        match self.lookup.lookup(&key).await {
            Ok(result) => {
                let data = result_value(&result)?;
                Ok(json_response(
                    200,
                    json!({
                        "message": QUERIES_COMPLETED_MESSAGE,
                        "data": data,
                    }),
                ))
            }
            Err(LookupError::NotFound { .. }) => Ok(message_response(404, NOT_FOUND_MESSAGE)),
            Err(error) => Err(error.into()),
        }
    }

    async fn route_batch(&self, batch: QueueBatch) -> Result<ApiGatewayResponse, RouteError> {
        info!(
            messages = batch.messages.len(),
            policy = ?self.policy,
            "routing queue batch"
        );

        let mut summary = BatchSummary::default();
        for message in &batch.messages {
            summary.processed += 1;
            match self.process_message(message).await {
                Ok(MessageOutcome::Published) => summary.published += 1,
                Ok(MessageOutcome::Skipped) => summary.skipped += 1,
                Err(failure) => match self.policy {
                    BatchFailurePolicy::FailFast => {
                        error!(
                            message_id = message.id(),
                            error = %failure,
                            remaining = batch.messages.len() - summary.processed,
                            "aborting queue batch"
                        );
                        return Err(failure);
                    }
                    BatchFailurePolicy::Continue => {
                        error!(
                            message_id = message.id(),
                            error = %failure,
                            "queue message failed, continuing with batch"
                        );
                        summary.failed += 1;
                    }
                },
            }
        }

        info!(
            processed = summary.processed,
            published = summary.published,
            skipped = summary.skipped,
            failed = summary.failed,
            "queue batch processed"
        );
        Ok(json_response(
            200,
            json!({
                "message": QUEUE_PROCESSED_MESSAGE,
                "processed": summary.processed,
                "published": summary.published,
                "skipped": summary.skipped,
                "failed": summary.failed,
            }),
        ))
    }

    async fn process_message(&self, message: &QueueMessage) -> Result<MessageOutcome, RouteError> {
        let parameters = match parse_parameters(message.body.as_ref()) {
            Ok(parameters) => parameters,
            Err(error) => {
                warn!(message_id = message.id(), %error, "skipping malformed queue message");
                return Ok(MessageOutcome::Skipped);
            }
        };
        let key = match parameters.into_key() {
            Ok(key) => key,
            Err(error) => {
                warn!(message_id = message.id(), %error, "skipping queue message");
                return Ok(MessageOutcome::Skipped);
            }
        };
        info!(
            message_id = message.id(),
            field = %key.field,
            value = %key.value,
            "looking up queue message"
        );

        let result = match self.lookup.lookup(&key).await {
            Ok(result) => result,
            Err(LookupError::NotFound { .. }) => {
                info!(message_id = message.id(), "no rows match queue message, skipping");
                return Ok(MessageOutcome::Skipped);
            }
            Err(error) => return Err(error.into()),
        };

        let receipt = self.publisher.publish(&result).await?;
        info!(
            message_id = message.id(),
            notification_id = receipt.message_id.as_deref().unwrap_or("unknown"),
            "queue message processed and published"
        );
        Ok(MessageOutcome::Published)
    }
}

/// Reads `queryField`/`queryValue` from a request or message body. The body
/// may be a JSON-encoded string or an already-parsed object; absent, `null`
/// and empty bodies yield no parameters.
fn parse_parameters(body: Option<&Value>) -> Result<LookupParameters, BodyError> {
    match body {
        None | Some(Value::Null) => Ok(LookupParameters::default()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(LookupParameters::default()),
        Some(Value::String(text)) => parameters_from(serde_json::from_str(text)?),
        Some(other) => parameters_from(other.clone()),
    }
}

/// Only a JSON object carries named parameters. Arrays would otherwise fill
/// the fields by position.
fn parameters_from(value: Value) -> Result<LookupParameters, BodyError> {
    match value {
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(BodyError::Shape),
    }
}

fn query_string_parameters(parameters: Option<&Map<String, Value>>) -> LookupParameters {
    let Some(parameters) = parameters else {
        return LookupParameters::default();
    };
    LookupParameters::new(
        parameters.get(QUERY_FIELD_PARAM).cloned(),
        parameters.get(QUERY_VALUE_PARAM).cloned(),
    )
}

fn key_error_response(error: &KeyError) -> ApiGatewayResponse {
    let message = match error {
        KeyError::MissingParameters => MISSING_PARAMETERS_MESSAGE,
        KeyError::InvalidField(_) => INVALID_FIELD_MESSAGE,
        KeyError::InvalidValue => INVALID_VALUE_MESSAGE,
    };
    message_response(400, message)
}

fn result_value(result: &LookupResult) -> Result<Value, RouteError> {
    serde_json::to_value(result).map_err(RouteError::Serialize)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use exam_lookup_core::contract::Table;
    use exam_lookup_core::test_helpers::{record, InMemoryRecordStore, StoreCall};

    use super::*;
    use crate::adapters::notification::PublishReceipt;

    struct CapturingPublisher {
        published: Mutex<Vec<LookupResult>>,
        fail_on_attempt: Option<usize>,
        attempts: Mutex<usize>,
    }

    impl CapturingPublisher {
        fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_on_attempt: None,
                attempts: Mutex::new(0),
            }
        }

        fn failing_on_attempt(attempt: usize) -> Self {
            Self {
                fail_on_attempt: Some(attempt),
                ..Self::new()
            }
        }

        fn published(&self) -> Vec<LookupResult> {
            self.published.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl NotificationPublisher for CapturingPublisher {
        async fn publish(&self, result: &LookupResult) -> Result<PublishReceipt, PublishError> {
            let attempt = {
                let mut attempts = self.attempts.lock().expect("poisoned mutex");
                *attempts += 1;
                *attempts
            };
            if self.fail_on_attempt == Some(attempt) {
                return Err(PublishError::Send("queue unavailable".into()));
            }

            self.published
                .lock()
                .expect("poisoned mutex")
                .push(result.clone());
            Ok(PublishReceipt {
                message_id: Some(format!("msg-{attempt}")),
            })
        }
    }

    fn seeded_store() -> InMemoryRecordStore {
        InMemoryRecordStore::new()
            .with_row(
                Table::Exam,
                record(&[("cpf", json!("111")), ("id_exame", json!(1))]),
            )
            .with_row(
                Table::Exam,
                record(&[("cpf", json!("222")), ("id_exame", json!(2))]),
            )
            .with_row(
                Table::Integration,
                record(&[("cpf", json!("111")), ("cod_integracao", json!("INT-1"))]),
            )
    }

    fn router(
        store: InMemoryRecordStore,
        publisher: CapturingPublisher,
        policy: BatchFailurePolicy,
    ) -> EventRouter<InMemoryRecordStore, CapturingPublisher> {
        EventRouter::new(LookupService::new(store), publisher, policy)
    }

    fn default_router() -> EventRouter<InMemoryRecordStore, CapturingPublisher> {
        router(
            seeded_store(),
            CapturingPublisher::new(),
            BatchFailurePolicy::FailFast,
        )
    }

    fn queue_record(id: &str, body: Value) -> Value {
        json!({
            "messageId": id,
            "eventSource": "aws:sqs",
            "body": body.to_string(),
        })
    }

    fn body_of(response: &ApiGatewayResponse) -> Value {
        response.body_json().expect("response body should be JSON")
    }

    #[tokio::test]
    async fn http_lookup_returns_both_tables() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "POST",
                "body": "{\"queryField\":\"cpf\",\"queryValue\":\"111\"}"
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        let body = body_of(&response);
        assert_eq!(body["message"], json!(QUERIES_COMPLETED_MESSAGE));
        assert_eq!(body["data"]["tb_exame"][0]["id_exame"], json!(1));
        assert_eq!(body["data"]["tb_exame"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            body["data"]["tb_integracao"][0]["cod_integracao"],
            json!("INT-1")
        );
    }

    #[tokio::test]
    async fn http_lookup_with_no_matching_rows_returns_404() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "POST",
                "body": "{\"queryField\":\"cpf\",\"queryValue\":\"123\"}"
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 404);
        let message = body_of(&response)["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_default();
        assert!(message.starts_with("parameter not found"));
        assert_eq!(
            router.lookup_service().store().calls(),
            vec![StoreCall::Count(Table::Exam)]
        );
    }

    #[tokio::test]
    async fn http_missing_value_is_rejected_before_any_query() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "POST",
                "body": "{\"queryField\":\"cpf\"}"
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 400);
        assert_eq!(body_of(&response)["message"], json!(MISSING_PARAMETERS_MESSAGE));
        assert!(router.lookup_service().store().calls().is_empty());
    }

    #[tokio::test]
    async fn http_parameters_fall_back_to_query_string_per_field() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "GET",
                "body": "{\"queryField\":\"cpf\"}",
                "queryStringParameters": {"queryField": "protocolo", "queryValue": "111"}
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(&response)["data"]["tb_exame"][0]["cpf"], json!("111"));
    }

    #[tokio::test]
    async fn http_query_string_alone_is_enough() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "GET",
                "body": null,
                "queryStringParameters": {"queryField": "cpf", "queryValue": "222"}
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(&response)["data"]["tb_exame"][0]["id_exame"], json!(2));
        assert_eq!(body_of(&response)["data"]["tb_integracao"], json!([]));
    }

    #[tokio::test]
    async fn http_field_outside_allow_list_is_rejected() {
        let router = default_router();
        let response = router
            .route(json!({
                "httpMethod": "GET",
                "queryStringParameters": {"queryField": "1=1 OR cpf", "queryValue": "x"}
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 400);
        assert_eq!(body_of(&response)["message"], json!(INVALID_FIELD_MESSAGE));
        assert!(router.lookup_service().store().calls().is_empty());
    }

    #[tokio::test]
    async fn http_malformed_body_is_rejected() {
        let router = default_router();
        let response = router
            .route(json!({"httpMethod": "POST", "body": "{not json"}))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 400);
        assert_eq!(body_of(&response)["message"], json!(MALFORMED_BODY_MESSAGE));
    }

    #[tokio::test]
    async fn http_query_failure_escapes_the_router() {
        let router = router(
            seeded_store().failing_on(StoreCall::Count(Table::Exam)),
            CapturingPublisher::new(),
            BatchFailurePolicy::FailFast,
        );

        let error = router
            .route(json!({
                "httpMethod": "GET",
                "queryStringParameters": {"queryField": "cpf", "queryValue": "111"}
            }))
            .await
            .expect_err("store failure should propagate");

        assert!(matches!(
            error,
            RouteError::Lookup(LookupError::QueryFailure { .. })
        ));
    }

    #[tokio::test]
    async fn batch_skips_message_missing_field_and_publishes_the_rest() {
        let router = default_router();
        let response = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "111"})),
                    queue_record("m-2", json!({"queryValue": "222"})),
                ]
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        let published = router.publisher().published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exam[0]["cpf"], json!("111"));

        let body = body_of(&response);
        assert_eq!(body["message"], json!(QUEUE_PROCESSED_MESSAGE));
        assert_eq!(body["published"], json!(1));
        assert_eq!(body["skipped"], json!(1));
    }

    #[tokio::test]
    async fn http_array_body_is_not_read_by_position() {
        let router = default_router();
        let response = router
            .route(json!({"httpMethod": "POST", "body": "[\"cpf\",\"111\"]"}))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 400);
        assert_eq!(body_of(&response)["message"], json!(MALFORMED_BODY_MESSAGE));
        assert!(router.lookup_service().store().calls().is_empty());
    }

    #[tokio::test]
    async fn batch_skips_array_bodies() {
        let router = default_router();
        let response = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!(["cpf", "111"])),
                    {"messageId": "m-2", "body": ["cpf", "222"]},
                ]
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        assert!(router.publisher().published().is_empty());
        let body = body_of(&response);
        assert_eq!(body["skipped"], json!(2));
        assert_eq!(body["published"], json!(0));
        assert!(router.lookup_service().store().calls().is_empty());
    }

    #[tokio::test]
    async fn batch_not_found_and_malformed_messages_do_not_stop_later_ones() {
        let router = default_router();
        let response = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "999"})),
                    {"messageId": "m-2", "body": "{broken"},
                    queue_record("m-3", json!({"queryField": "nome", "queryValue": "x"})),
                    queue_record("m-4", json!({"queryField": "cpf", "queryValue": "222"})),
                ]
            }))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        let published = router.publisher().published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exam[0]["id_exame"], json!(2));
        assert_eq!(body_of(&response)["skipped"], json!(3));
    }

    #[tokio::test]
    async fn batch_publishes_in_message_order() {
        let router = default_router();
        router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "222"})),
                    queue_record("m-2", json!({"queryField": "cpf", "queryValue": "111"})),
                ]
            }))
            .await
            .expect("route should succeed");

        let ids: Vec<_> = router
            .publisher()
            .published()
            .iter()
            .map(|result| result.exam[0]["id_exame"].clone())
            .collect();
        assert_eq!(ids, vec![json!(2), json!(1)]);
    }

    #[tokio::test]
    async fn fail_fast_aborts_remaining_messages_on_publish_failure() {
        let router = router(
            seeded_store(),
            CapturingPublisher::failing_on_attempt(1),
            BatchFailurePolicy::FailFast,
        );

        let error = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "111"})),
                    queue_record("m-2", json!({"queryField": "cpf", "queryValue": "222"})),
                ]
            }))
            .await
            .expect_err("publish failure should abort the batch");

        assert!(matches!(error, RouteError::Publish(_)));
        assert!(router.publisher().published().is_empty());
        let counts = router
            .lookup_service()
            .store()
            .calls()
            .into_iter()
            .filter(|call| *call == StoreCall::Count(Table::Exam))
            .count();
        assert_eq!(counts, 1);
    }

    #[tokio::test]
    async fn continue_policy_reports_failure_and_keeps_going() {
        let router = router(
            seeded_store(),
            CapturingPublisher::failing_on_attempt(1),
            BatchFailurePolicy::Continue,
        );

        let response = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "111"})),
                    queue_record("m-2", json!({"queryField": "cpf", "queryValue": "222"})),
                ]
            }))
            .await
            .expect("continue policy should not fail the batch");

        assert_eq!(response.status_code, 200);
        assert_eq!(router.publisher().published().len(), 1);
        let body = body_of(&response);
        assert_eq!(body["failed"], json!(1));
        assert_eq!(body["published"], json!(1));
        assert_eq!(body["processed"], json!(2));
    }

    #[tokio::test]
    async fn fail_fast_aborts_remaining_messages_on_store_failure() {
        let router = router(
            seeded_store().failing_on(StoreCall::Fetch(Table::Integration)),
            CapturingPublisher::new(),
            BatchFailurePolicy::FailFast,
        );

        let error = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "111"})),
                    queue_record("m-2", json!({"queryField": "cpf", "queryValue": "222"})),
                ]
            }))
            .await
            .expect_err("store failure should abort the batch");

        match error {
            RouteError::Lookup(LookupError::QueryFailure { table, .. }) => {
                assert_eq!(table, Table::Integration)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(router.publisher().published().is_empty());
        assert_eq!(
            router.lookup_service().store().calls(),
            vec![
                StoreCall::Count(Table::Exam),
                StoreCall::Fetch(Table::Exam),
                StoreCall::Fetch(Table::Integration),
            ]
        );
    }

    #[tokio::test]
    async fn continue_policy_counts_store_failure_and_handles_next_message() {
        let router = router(
            seeded_store().failing_on(StoreCall::Fetch(Table::Integration)),
            CapturingPublisher::new(),
            BatchFailurePolicy::Continue,
        );

        let response = router
            .route(json!({
                "Records": [
                    queue_record("m-1", json!({"queryField": "cpf", "queryValue": "111"})),
                    queue_record("m-2", json!({"queryField": "cpf", "queryValue": "999"})),
                ]
            }))
            .await
            .expect("continue policy should not fail the batch");

        assert_eq!(response.status_code, 200);
        assert!(router.publisher().published().is_empty());
        let body = body_of(&response);
        assert_eq!(body["processed"], json!(2));
        assert_eq!(body["failed"], json!(1));
        assert_eq!(body["skipped"], json!(1));
        let counts = router
            .lookup_service()
            .store()
            .calls()
            .into_iter()
            .filter(|call| *call == StoreCall::Count(Table::Exam))
            .count();
        assert_eq!(counts, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_processed() {
        let router = default_router();
        let response = router
            .route(json!({"Records": []}))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(&response)["processed"], json!(0));
    }

    #[tokio::test]
    async fn unknown_event_is_rejected() {
        let router = default_router();
        let response = router
            .route(json!({"source": "aws.events"}))
            .await
            .expect("route should succeed");

        assert_eq!(response.status_code, 400);
        assert_eq!(body_of(&response), json!({"message": INVALID_EVENT_MESSAGE}));
    }

    #[test]
    fn batch_policy_parses_known_names() {
        assert_eq!(
            "fail_fast".parse::<BatchFailurePolicy>(),
            Ok(BatchFailurePolicy::FailFast)
        );
        assert_eq!(
            "Continue".parse::<BatchFailurePolicy>(),
            Ok(BatchFailurePolicy::Continue)
        );
        assert!("retry".parse::<BatchFailurePolicy>().is_err());
    }
}

use std::error::Error as StdError;

use exam_lookup_core::lookup::RecordStore;
use serde_json::Value;
use tracing::{error, info};

use crate::adapters::notification::NotificationPublisher;
use crate::handlers::response::{internal_error_response, ApiGatewayResponse};
use crate::handlers::router::{EventRouter, RouteError};

/// Failure boundary around [`EventRouter::route`]. Every path ends in a
/// structured response; nothing is returned to the runtime as an error.
pub async fn handle_event<S, P>(router: &EventRouter<S, P>, event: Value) -> ApiGatewayResponse
where
    S: RecordStore,
    P: NotificationPublisher,
{
    info!("processing inbound event");
    match router.route(event).await {
        Ok(response) => {
            info!(status_code = response.status_code, "event processed");
            response
        }
        Err(failure) => {
            error!(
                error = %failure,
                cause = %cause_chain(&failure),
                "event processing failed"
            );
            internal_error_response(&failure.to_string())
        }
    }
}

/// Underlying causes joined for the log line. Never sent back to callers.
fn cause_chain(error: &RouteError) -> String {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes.join(": ")
}

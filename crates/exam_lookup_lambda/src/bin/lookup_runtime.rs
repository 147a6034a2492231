use aws_sdk_sqs::config::Region;
use envconfig::Envconfig;
use exam_lookup_core::lookup::LookupService;
use exam_lookup_lambda::adapters::notification::SqsNotificationPublisher;
use exam_lookup_lambda::adapters::record_store::MySqlRecordStore;
use exam_lookup_lambda::config::Config;
use exam_lookup_lambda::handlers::entry::handle_event;
use exam_lookup_lambda::handlers::response::ApiGatewayResponse;
use exam_lookup_lambda::handlers::router::EventRouter;
use exam_lookup_lambda::telemetry::init_tracing;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

async fn sqs_client(config: &Config) -> aws_sdk_sqs::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()));
    if let Some(endpoint) = config.aws_endpoint_url.as_deref() {
        loader = loader.endpoint_url(endpoint);
    }
    aws_sdk_sqs::Client::new(&loader.load().await)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::init_from_env()
        .map_err(|error| Error::from(format!("invalid configuration: {error}")))?;
    init_tracing(config.log_format)?;
    info!(?config, "starting exam lookup runtime");

    let store = MySqlRecordStore::connect_lazy(&config);
    let publisher = SqsNotificationPublisher::new(
        sqs_client(&config).await,
        config.notification_queue_url.as_str(),
    );
    let router = EventRouter::new(
        LookupService::new(store),
        publisher,
        config.batch_failure_policy,
    );
    let router = &router;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<ApiGatewayResponse, Error>(handle_event(router, event.payload).await)
    }))
    .await
}

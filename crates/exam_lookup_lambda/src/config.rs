use std::fmt;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::handlers::router::BatchFailurePolicy;
use crate::telemetry::LogFormat;

/// Everything the handler needs, read once at cold start and passed to the
/// adapters explicitly.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "DATABASE_HOST", default = "localhost")]
    pub database_host: String,

    #[envconfig(from = "DATABASE_PORT", default = "3306")]
    pub database_port: u16,

    #[envconfig(from = "DATABASE_USER", default = "root")]
    pub database_user: String,

    #[envconfig(from = "DATABASE_PASSWORD")]
    pub database_password: String,

    #[envconfig(from = "DATABASE_NAME", default = "Backoffice")]
    pub database_name: String,

    #[envconfig(from = "DATABASE_CONNECT_TIMEOUT_MS", default = "10000")]
    pub database_connect_timeout: EnvMsDuration,

    #[envconfig(from = "DATABASE_MAX_CONNECTIONS", default = "2")]
    pub database_max_connections: u32,

    #[envconfig(from = "NOTIFICATION_QUEUE_URL")]
    pub notification_queue_url: NonEmptyString,

    #[envconfig(from = "AWS_REGION", default = "us-east-1")]
    pub aws_region: String,

    #[envconfig(from = "AWS_ENDPOINT_URL")]
    pub aws_endpoint_url: Option<String>,

    #[envconfig(from = "BATCH_FAILURE_POLICY", default = "fail_fast")]
    pub batch_failure_policy: BatchFailurePolicy,

    #[envconfig(from = "LOG_FORMAT", default = "json")]
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_host", &self.database_host)
            .field("database_port", &self.database_port)
            .field("database_user", &self.database_user)
            .field("database_password", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("database_connect_timeout", &self.database_connect_timeout)
            .field("database_max_connections", &self.database_max_connections)
            .field("notification_queue_url", &self.notification_queue_url)
            .field("aws_region", &self.aws_region)
            .field("aws_endpoint_url", &self.aws_endpoint_url)
            .field("batch_failure_policy", &self.batch_failure_policy)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(trimmed.to_owned()))
        }
    }
}

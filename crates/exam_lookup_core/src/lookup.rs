use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::contract::{KeyError, LookupKey, LookupResult, LookupValue, QueryField, Record, Table};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the data access layer. The messages describe the failing step
/// only; driver details stay in `source`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not acquire a database connection")]
    Connection(#[source] BoxError),
    #[error("query execution failed")]
    Query(#[source] BoxError),
    #[error("could not decode column '{column}'")]
    Decode {
        column: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("query field '{0}' is not allowed")]
    InvalidField(String),
    #[error("no {table} rows match {field}")]
    NotFound { table: Table, field: QueryField },
    #[error("query against {table} failed")]
    QueryFailure {
        table: Table,
        #[source]
        source: StoreError,
    },
}

/// Parameterized equality queries against the lookup tables.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count_matching(&self, table: Table, key: &LookupKey) -> Result<u64, StoreError>;

    async fn fetch_matching(
        &self,
        table: Table,
        key: &LookupKey,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Existence check on `tb_exame`, then a fetch of both tables by the same key.
pub struct LookupService<S> {
    store: S,
}

impl<S: RecordStore> LookupService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates `field` against the allow-list before running [`Self::lookup`].
    pub async fn lookup_raw(
        &self,
        field: &str,
        value: LookupValue,
    ) -> Result<LookupResult, LookupError> {
        let field = field.parse::<QueryField>().map_err(|error| match error {
            KeyError::InvalidField(name) => LookupError::InvalidField(name),
            other => LookupError::InvalidField(other.to_string()),
        })?;
        self.lookup(&LookupKey::new(field, value)).await
    }

    pub async fn lookup(&self, key: &LookupKey) -> Result<LookupResult, LookupError> {
        let matches = self
            .store
            .count_matching(Table::Exam, key)
            .await
            .map_err(|source| LookupError::QueryFailure {
                table: Table::Exam,
                source,
            })?;

        if matches == 0 {
            info!(field = %key.field, value = %key.value, "no exam rows match lookup key");
            return Err(LookupError::NotFound {
                table: Table::Exam,
                field: key.field,
            });
        }
        debug!(field = %key.field, matches, "exam rows found, fetching both tables");

        let exam = self.fetch(Table::Exam, key).await?;
        let integration = self.fetch(Table::Integration, key).await?;

        info!(
            field = %key.field,
            exam_rows = exam.len(),
            integration_rows = integration.len(),
            "lookup completed"
        );
        Ok(LookupResult { exam, integration })
    }

    async fn fetch(&self, table: Table, key: &LookupKey) -> Result<Vec<Record>, LookupError> {
        self.store
            .fetch_matching(table, key)
            .await
            .map_err(|source| LookupError::QueryFailure { table, source })
    }
}

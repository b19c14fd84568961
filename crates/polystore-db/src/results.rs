use polystore_domain::StoreError;
use thiserror::Error as ThisError;

/// Single record lookup errors
#[derive(Debug, Clone, ThisError)]
pub enum QueryError {
    #[error("Not found")]
    NotFound,
    #[error("Ambiguous results ({0:?}) for query")]
    Ambiguous(usize),
}

impl From<QueryError> for StoreError {
    fn from(err: QueryError) -> Self {
        StoreError::read(err)
    }
}

use polystore_db::{DynamoTarget, MongoTarget};

/// Where each demo connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Parsed when the relational demo starts, so a bad DSN is reported
    /// as a connection error
    pub mysql_dsn: String,
    pub document: MongoTarget,
    pub wide_column: DynamoTarget,
}

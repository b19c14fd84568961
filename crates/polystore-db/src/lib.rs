
pub mod results;

pub mod relational;
pub use relational::{SqlClient, SqlFilter, SqlTarget};

pub mod document;
pub use document::{MongoClient, MongoTarget};

pub mod wide_column;
pub use wide_column::{DynamoClient, DynamoTarget, ScanFilter};

pub mod memory;
pub use memory::{MemoryStore, MemoryTarget, Predicate};

#[cfg(test)]
mod contract;

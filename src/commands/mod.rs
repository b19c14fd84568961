pub mod document;
pub mod relational;
pub mod wide_column;

use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Config;
use crate::dispatch::{Backend, Runner};

/// Runs the canned walkthrough of the selected backend. Every walkthrough
/// closes its client, also when an operation fails.
pub struct Demos {
    config: Config,
}

impl Demos {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Runner for Demos {
    async fn run(&self, backend: Backend, out: &mut (dyn Write + Send)) -> Result<()> {
        match backend {
            Backend::MySql => relational::run(&self.config.mysql_dsn, out).await,
            Backend::MongoDb => document::run(&self.config.document, out).await,
            Backend::DynamoDb => wide_column::run(&self.config.wide_column, out).await,
        }
    }
}

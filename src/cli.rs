use clap::Parser;

use polystore_db::{DynamoTarget, MongoTarget};

use crate::config::Config;
use crate::logging::LogLevel;

#[derive(Parser, Debug)]
#[clap(name = "polystore", version=env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// MySQL DSN, `user:pass@tcp(host:port)/schema` or a URL
    #[clap(
        long,
        env = "POLYSTORE_MYSQL_DSN",
        default_value = "root:root@tcp(127.0.0.1:3306)/testing"
    )]
    pub mysql_dsn: String,

    #[clap(long, env = "POLYSTORE_MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,
    #[clap(long, default_value = "test")]
    pub mongodb_database: String,

    /// Local DynamoDB endpoint
    #[clap(long, env = "POLYSTORE_DYNAMODB_ENDPOINT", default_value = "http://localhost:8003")]
    pub dynamodb_endpoint: String,
    /// Use the AWS endpoint and default credentials instead
    #[clap(long)]
    pub dynamodb_cloud: bool,
    #[clap(long, default_value = "us-west-2")]
    pub dynamodb_region: String,

    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Self::parse()
    }

    /// Connection targets for the demos
    pub fn config(&self) -> Config {
        let wide_column = if self.dynamodb_cloud {
            DynamoTarget::cloud(&self.dynamodb_region)
        } else {
            DynamoTarget {
                region: self.dynamodb_region.clone(),
                endpoint: Some(self.dynamodb_endpoint.clone()),
            }
        };
        Config {
            mysql_dsn: self.mysql_dsn.clone(),
            document: MongoTarget::new(&self.mongodb_uri, &self.mongodb_database),
            wide_column,
        }
    }
}

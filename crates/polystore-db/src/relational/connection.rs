use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use polystore_domain::{Connect, Result, StoreError};
use sqlx::{AnyConnection, Connection as SqlConnection};
use tokio::sync::Mutex;

use super::SqlClient;

/// A connection shared between the client and the streams it hands out.
/// `None` once closed.
pub type Connection = Arc<Mutex<Option<AnyConnection>>>;

/// Where to connect, as a sqlx URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTarget {
    pub url: String,
}

impl SqlTarget {
    /// Accepts `user:pass@host:port/schema`, the go-driver form
    /// `user:pass@tcp(host:port)/schema` or a full `mysql://` / `sqlite:` URL.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(StoreError::connection("empty DSN"));
        }
        if dsn.contains("://") || dsn.starts_with("sqlite:") {
            return Ok(Self {
                url: dsn.to_string(),
            });
        }

        let (credentials, rest) = match dsn.rsplit_once('@') {
            Some((credentials, rest)) => (Some(credentials), rest),
            None => (None, dsn),
        };
        let (address, schema) = match rest.split_once('/') {
            Some((address, schema)) => (address, Some(schema)),
            None => (rest, None),
        };
        let address = match address.strip_prefix("tcp(") {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| StoreError::connection(format!("malformed DSN `{}`", dsn)))?,
            None => address,
        };
        if address.is_empty() {
            return Err(StoreError::connection(format!(
                "DSN `{}` has no host",
                dsn
            )));
        }

        let mut url = String::from("mysql://");
        if let Some(credentials) = credentials {
            url.push_str(credentials);
            url.push('@');
        }
        url.push_str(address);
        if let Some(schema) = schema.filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(schema);
        }
        Ok(Self { url })
    }

    /// The URL with the password masked, for logging
    pub fn redacted(&self) -> String {
        match (self.url.split_once("://"), self.url.rsplit_once('@')) {
            (Some((scheme, rest)), Some((_, host))) if rest.contains('@') => {
                let user = rest.split(['@', ':']).next().unwrap_or_default();
                format!("{}://{}:***@{}", scheme, user, host)
            }
            _ => self.url.clone(),
        }
    }
}

/// Open a connection to the database
pub async fn open(target: &SqlTarget) -> Result<Connection> {
    sqlx::any::install_default_drivers();
    let conn = AnyConnection::connect(&target.url)
        .await
        .map_err(StoreError::connection)?;
    info!("connected to {}", target.redacted());
    Ok(Arc::new(Mutex::new(Some(conn))))
}

pub struct TestHandle {
    filename: String,
}

impl Drop for TestHandle {
    fn drop(&mut self) {
        let path = Path::new(&self.filename);
        if path.exists() {
            fs::remove_file(path).unwrap();
        }
    }
}

/// Open a client on a new, empty SQLite database file.
/// The file is removed when the handle is dropped.
pub async fn open_test() -> (TestHandle, SqlClient) {
    let filename = format!("/tmp/polystore_test_{}.sqlite3", rand::random::<u64>());
    let handle = TestHandle {
        filename: filename.clone(),
    };
    let target = SqlTarget {
        url: format!("sqlite:{}?mode=rwc", filename),
    };
    let client = SqlClient::connect(&target).await.unwrap();
    (handle, client)
}

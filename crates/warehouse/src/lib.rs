//! Redshift warehouse adapter
//!
//! Redshift speaks the PostgreSQL wire protocol, so statements are executed
//! with `tokio-postgres`. JDBC-style identifiers
//! (`jdbc:redshift://host:5439/dev`) are accepted and translated.

use anyhow::{Context, Result};
use load_core::{quote_ident, Warehouse};
use std::str::FromStr;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info};

/// Default Redshift port.
pub const REDSHIFT_PORT: u16 = 5439;

const JDBC_PREFIX: &str = "jdbc:redshift://";

/// Build a connection config from a warehouse identifier.
///
/// `jdbc:redshift://` identifiers are rewritten to `postgresql://` and get
/// port 5439 when none is given. JDBC parameters after `?` or `;` are
/// dropped. `user` and `password` override whatever the identifier carries.
pub fn connection_config(
    identifier: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<tokio_postgres::Config> {
    let identifier = identifier.trim();
    let (url, is_jdbc) = match identifier.strip_prefix(JDBC_PREFIX) {
        Some(rest) => (format!("postgresql://{rest}"), true),
        None => (identifier.to_string(), false),
    };
    let url = match url.find(['?', ';']) {
        Some(idx) => {
            debug!("Ignoring connection parameters: {}", &url[idx..]);
            url[..idx].to_string()
        }
        None => url,
    };

    let mut config = tokio_postgres::Config::from_str(&url)
        .with_context(|| format!("Invalid warehouse identifier: {identifier}"))?;

    if is_jdbc && config.get_ports().is_empty() {
        config.port(REDSHIFT_PORT);
    }
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        config.user(user);
    }
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        config.password(password);
    }
    Ok(config)
}

/// [`Warehouse`] backed by a single Redshift connection.
pub struct RedshiftWarehouse {
    client: Client,
}

impl RedshiftWarehouse {
    /// Connect and spawn the connection driver.
    pub async fn connect(config: &tokio_postgres::Config) -> Result<Self> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .context("Failed to connect to Redshift")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Redshift connection error: {e}");
            }
        });

        info!(
            "Connected to Redshift database {}",
            config.get_dbname().unwrap_or("<default>")
        );
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Split `schema.table`; an unqualified name has no schema.
fn split_table_name(table: &str) -> (Option<&str>, &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) => (Some(schema.trim()), name.trim()),
        None => (None, table.trim()),
    }
}

#[async_trait::async_trait]
impl Warehouse for RedshiftWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let (schema, name) = split_table_name(table);
        let row = match schema {
            Some(schema) => {
                self.client
                    .query_one(
                        "SELECT COUNT(*) FROM information_schema.tables \
                         WHERE table_schema = $1::varchar AND table_name = $2::varchar",
                        &[&schema, &name],
                    )
                    .await
            }
            None => {
                self.client
                    .query_one(
                        "SELECT COUNT(*) FROM information_schema.tables \
                         WHERE table_schema = current_schema() AND table_name = $1::varchar",
                        &[&name],
                    )
                    .await
            }
        }
        .with_context(|| format!("Failed to check whether table {table} exists"))?;

        let count: i64 = row.try_get(0)?;
        debug!("Table {} exists: {}", table, count > 0);
        Ok(count > 0)
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let messages = self.client.simple_query(sql).await?;
        let affected = messages
            .iter()
            .map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => *rows,
                _ => 0,
            })
            .sum();
        Ok(affected)
    }

    async fn row_count(&self, table: &str) -> Result<Option<u64>> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row = self
            .client
            .query_one(sql.as_str(), &[])
            .await
            .with_context(|| format!("Failed to count rows of {table}"))?;
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).ok())
    }
}

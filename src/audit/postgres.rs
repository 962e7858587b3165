use anyhow::{Context, Result};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::audit::sink::{AuditEntry, AuditRecord, AuditSink};
use crate::config::PostgresAuditConfig;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS account_actions_log (
    id BIGSERIAL PRIMARY KEY,
    action_type TEXT NOT NULL,
    sam_account_name TEXT NOT NULL,
    reference TEXT NOT NULL,
    additional_details TEXT,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_actions_sam_account ON account_actions_log (sam_account_name)",
    "CREATE INDEX IF NOT EXISTS idx_actions_reference ON account_actions_log (reference)",
    "CREATE INDEX IF NOT EXISTS idx_actions_recorded_at ON account_actions_log (recorded_at)",
];

const INSERT_ENTRY: &str = "INSERT INTO account_actions_log
    (action_type, sam_account_name, reference, additional_details, recorded_at)
    VALUES ($1, $2, $3, $4, CAST($5::text AS timestamptz))";

const SELECT_RECENT: &str = "SELECT id, action_type, sam_account_name, reference, additional_details,
    to_char(recorded_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"Z\"') AS recorded_at_utc
    FROM account_actions_log
    ORDER BY recorded_at DESC, id DESC
    LIMIT $1";

/// Upper bound on rows returned by one history read
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// PostgreSQL-backed action log
pub struct PostgresAuditLog {
    client: Client,
}

impl PostgresAuditLog {
    /// Connect and make sure the log table exists
    pub async fn connect(config: &PostgresAuditConfig) -> Result<Self> {
        info!(
            "Connecting to audit database at {}:{}",
            config.host, config.port
        );

        let connection_string = Self::build_connection_string(config);

        let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
            .await
            .context("Failed to connect to audit database")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Audit database connection error: {}", e);
            }
        });

        client
            .batch_execute(CREATE_TABLE)
            .await
            .context("Failed to create account_actions_log table")?;
        for statement in CREATE_INDEXES {
            client
                .batch_execute(statement)
                .await
                .context("Failed to create account_actions_log index")?;
        }

        info!("Audit database ready");
        Ok(Self { client })
    }

    fn build_connection_string(config: &PostgresAuditConfig) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            Self::quote_value(&config.host),
            config.port,
            Self::quote_value(&config.username),
            Self::quote_value(&config.password),
            Self::quote_value(&config.database),
            Self::quote_value(&config.ssl_mode)
        )
    }

    /// Most recent entries first, at most `limit` rows
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>> {
        let limit = Self::clamp_limit(limit);
        debug!("Reading last {} action log entries", limit);

        let rows = self
            .client
            .query(SELECT_RECENT, &[&limit])
            .await
            .context("Failed to read action log")?;

        rows.iter()
            .map(|row| {
                let recorded_at: String = row.try_get("recorded_at_utc")?;
                AuditRecord::from_columns(
                    row.try_get("id")?,
                    row.try_get("action_type")?,
                    row.try_get("sam_account_name")?,
                    row.try_get("reference")?,
                    row.try_get("additional_details")?,
                    &recorded_at,
                )
            })
            .collect()
    }

    fn clamp_limit(limit: i64) -> i64 {
        limit.clamp(1, MAX_HISTORY_LIMIT)
    }

    /// Quote a libpq keyword value so spaces and quotes survive
    fn quote_value(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

#[async_trait::async_trait]
impl AuditSink for PostgresAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        let details = entry.details.as_ref().map(|d| d.to_string());
        let recorded_at = entry.recorded_at.to_rfc3339();

        debug!(
            "Recording {} for {} ({})",
            entry.action_label(),
            entry.target,
            entry.reference
        );

        self.client
            .execute(
                INSERT_ENTRY,
                &[
                    &entry.action_label(),
                    &entry.target,
                    &entry.reference,
                    &details,
                    &recorded_at,
                ],
            )
            .await
            .context("Failed to write audit entry")?;

        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_value() {
        assert_eq!(PostgresAuditLog::quote_value("acctops"), "'acctops'");
        assert_eq!(PostgresAuditLog::quote_value("it's"), "'it\\'s'");
        assert_eq!(PostgresAuditLog::quote_value("a b"), "'a b'");
    }

    #[test]
    fn test_build_connection_string() {
        let config = PostgresAuditConfig {
            host: "localhost".to_string(),
            port: 5432,
            username: "acctops".to_string(),
            password: "p@ss word".to_string(),
            database: "audit".to_string(),
            ssl_mode: "prefer".to_string(),
        };

        let conn_str = PostgresAuditLog::build_connection_string(&config);
        assert!(conn_str.contains("host='localhost'"));
        assert!(conn_str.contains("port=5432"));
        assert!(conn_str.contains("user='acctops'"));
        assert!(conn_str.contains("password='p@ss word'"));
        assert!(conn_str.contains("dbname='audit'"));
        assert!(conn_str.contains("sslmode='prefer'"));
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(PostgresAuditLog::clamp_limit(0), 1);
        assert_eq!(PostgresAuditLog::clamp_limit(100), 100);
        assert_eq!(PostgresAuditLog::clamp_limit(50_000), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn test_recent_query_is_newest_first_and_bounded() {
        assert!(SELECT_RECENT.contains("ORDER BY recorded_at DESC, id DESC"));
        assert!(SELECT_RECENT.contains("LIMIT $1"));
        assert!(SELECT_RECENT.contains("AS recorded_at_utc"));
        assert!(!SELECT_RECENT.contains("password"));
    }
}

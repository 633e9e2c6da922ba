//! PostgreSQL persistence for collected analysis results.

use crate::collect::AnalysisRecord;
use crate::config::EnvSource;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

pub const TABLE_NAME: &str = "sonarqube_results";

/// Fixed leading columns of every inserted row
const BASE_COLUMNS: [&str; 5] = [
    "repo_name",
    "project_key",
    "analysis_date",
    "branch",
    "quality_gate_status",
];

pub const CREATE_INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS idx_sonarqube_results_repo_date \
     ON sonarqube_results(repo_name, analysis_date)";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid DB_PORT '{0}'")]
    InvalidPort(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Connection settings from `DB_*` variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbSettings {
    pub fn from_env(env: &dyn EnvSource) -> StoreResult<Self> {
        let port: u16 = match env.non_empty("DB_PORT") {
            Some(raw) => raw.parse().map_err(|_| StoreError::InvalidPort(raw))?,
            None => 5432,
        };
        Ok(Self {
            host: env
                .non_empty("DB_HOST")
                .unwrap_or_else(|| "localhost".to_string()),
            port,
            database: env
                .non_empty("DB_NAME")
                .unwrap_or_else(|| "postgres".to_string()),
            user: env
                .non_empty("DB_USER")
                .unwrap_or_else(|| "postgres".to_string()),
            password: env
                .non_empty("DB_PASS")
                .unwrap_or_else(|| "postgres".to_string()),
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

pub fn create_table_sql(metrics: &[&str]) -> String {
    let metric_columns = metrics
        .iter()
        .map(|m| format!("    {} VARCHAR(64) DEFAULT NULL", m))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (
    id SERIAL PRIMARY KEY,
    repo_name VARCHAR(255) NOT NULL,
    project_key VARCHAR(255) NOT NULL,
    analysis_date TIMESTAMP WITH TIME ZONE NOT NULL,
    branch VARCHAR(100) DEFAULT 'main',
    quality_gate_status VARCHAR(20),
{metric_columns},
    created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
)"
    )
}

pub fn insert_sql(metrics: &[&str]) -> String {
    let columns: Vec<&str> = BASE_COLUMNS.iter().chain(metrics.iter()).copied().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE_NAME,
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub struct ResultStore {
    pool: PgPool,
}

impl ResultStore {
    pub async fn connect(settings: &DbSettings) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(settings.connect_options())
            .await?;
        Ok(Self { pool })
    }

    pub async fn setup(&self, metrics: &[&str]) -> StoreResult<()> {
        sqlx::query(&create_table_sql(metrics))
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_INDEX_SQL).execute(&self.pool).await?;
        info!("Database setup complete. {} table is ready.", TABLE_NAME);
        Ok(())
    }

    /// Insert all records in one transaction. Returns the number of rows written.
    pub async fn insert(&self, records: &[AnalysisRecord], metrics: &[&str]) -> StoreResult<u64> {
        let sql = insert_sql(metrics);
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let mut query = sqlx::query(&sql)
                .bind(&record.repo_name)
                .bind(&record.project_key)
                .bind(record.analysis_date)
                .bind(&record.branch)
                .bind(&record.quality_gate_status);
            for value in record.metric_values(metrics) {
                query = query.bind(value);
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        info!("Inserted {} SonarQube analysis records.", written);
        Ok(written)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

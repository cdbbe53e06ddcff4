//! Postgres ValidationResult store
//!
//! One row per entity in `validation_results`. Every mutation is a single
//! conditional UPDATE, so concurrent writers serialize on the row and a
//! superseded version simply matches no row.
//!
//! All queries are runtime-checked (`sqlx::query`) so the crate builds
//! without a database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ports::ValidationResultStore;
use crate::validation_result::{
    GlobalValidationStatus, SingleValidationResult, ValidationAuthor, ValidationResult,
};

/// DDL for the backing table
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS validation_results (
    uuid UUID PRIMARY KEY,
    entity_uuid UUID NOT NULL UNIQUE,
    submission_id TEXT NOT NULL,
    version BIGINT NOT NULL DEFAULT 0,
    global_status TEXT NOT NULL DEFAULT 'Pending',
    expected_results JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const COLUMNS: &str =
    "uuid, entity_uuid, submission_id, version, global_status, expected_results, updated_at";

pub struct PgValidationResultStore {
    pool: PgPool,
}

impl PgValidationResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self::new(pool))
    }

    fn from_row(row: &PgRow) -> Result<ValidationResult> {
        let version: i64 = row.try_get("version")?;
        let status: String = row.try_get("global_status")?;
        let expected: serde_json::Value = row.try_get("expected_results")?;
        let expected_results: BTreeMap<ValidationAuthor, Vec<SingleValidationResult>> =
            serde_json::from_value(expected)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(ValidationResult {
            uuid: row.try_get("uuid")?,
            entity_uuid: row.try_get("entity_uuid")?,
            submission_id: row.try_get("submission_id")?,
            version: u64::try_from(version)?,
            global_status: GlobalValidationStatus::try_from(status).map_err(|e| anyhow!(e))?,
            expected_results,
            updated_at,
        })
    }
}

fn to_db_version(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| anyhow!("version {} out of range", version))
}

#[async_trait]
impl ValidationResultStore for PgValidationResultStore {
    async fn insert(&self, result: &ValidationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO validation_results
                (uuid, entity_uuid, submission_id, version, global_status, expected_results, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(result.uuid)
        .bind(result.entity_uuid)
        .bind(&result.submission_id)
        .bind(to_db_version(result.version)?)
        .bind(result.global_status.as_str())
        .bind(serde_json::to_value(&result.expected_results)?)
        .bind(result.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_entity_uuid(&self, entity_uuid: Uuid) -> Result<Option<ValidationResult>> {
        let query = format!("SELECT {COLUMNS} FROM validation_results WHERE entity_uuid = $1");
        let row = sqlx::query(&query)
            .bind(entity_uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn open_round(
        &self,
        entity_uuid: Uuid,
        authors: &[ValidationAuthor],
    ) -> Result<Option<ValidationResult>> {
        let seeded: BTreeMap<ValidationAuthor, Vec<SingleValidationResult>> =
            authors.iter().map(|a| (*a, Vec::new())).collect();
        let query = format!(
            r#"
            UPDATE validation_results
            SET version = version + 1,
                global_status = 'Pending',
                expected_results = $2,
                updated_at = now()
            WHERE entity_uuid = $1
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(entity_uuid)
            .bind(serde_json::to_value(&seeded)?)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn merge_author_results(
        &self,
        entity_uuid: Uuid,
        version: Option<u64>,
        author: ValidationAuthor,
        results: &[SingleValidationResult],
    ) -> Result<bool> {
        let version = version.map(to_db_version).transpose()?;
        let updated = sqlx::query(
            r#"
            UPDATE validation_results
            SET expected_results = jsonb_set(expected_results, ARRAY[$3::text], $4, true),
                updated_at = now()
            WHERE entity_uuid = $1
              AND ($2::bigint IS NULL OR version = $2)
            "#,
        )
        .bind(entity_uuid)
        .bind(version)
        .bind(author.as_str())
        .bind(serde_json::to_value(results)?)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn mark_complete(&self, entity_uuid: Uuid, version: u64) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE validation_results
            SET global_status = 'Complete', updated_at = now()
            WHERE entity_uuid = $1 AND version = $2
            "#,
        )
        .bind(entity_uuid)
        .bind(to_db_version(version)?)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }
}

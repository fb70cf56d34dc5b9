//! SQLite implementations of the persistence collaborators
//!
//! Attribute maps, session snapshots and log items are stored as JSON text
//! columns next to the handful of columns that are queried directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    Agency, AttributeMap, BatchTally, CandidateRecord, EnforcementRecord, EnforcementStore, NaturalKey,
    ProcessingLog, ProcessingLogStore, RecordType, Session, SessionStore, StoreError,
};

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{value}': {e}")))
}

fn parse_code<T: FromStr>(value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Serialization(e.to_string()))
}

fn read_count(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

/// Enforcement records with a UNIQUE natural key
#[derive(Debug, Clone)]
pub struct SqliteEnforcementStore {
    pool: SqlitePool,
}

impl SqliteEnforcementStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &SqliteRow) -> Result<EnforcementRecord, StoreError> {
        let id: String = row.try_get("id")?;
        let agency: String = row.try_get("agency")?;
        let record_type: String = row.try_get("record_type")?;
        let attrs: String = row.try_get("attrs")?;
        let inserted_at: String = row.try_get("inserted_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(EnforcementRecord {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
            key: NaturalKey::new(
                parse_code::<Agency>(&agency)?,
                parse_code::<RecordType>(&record_type)?,
                row.try_get::<String, _>("regulator_id")?,
            ),
            attrs: serde_json::from_str(&attrs)?,
            inserted_at: parse_timestamp(&inserted_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[async_trait]
impl EnforcementStore for SqliteEnforcementStore {
    async fn create(&self, candidate: &CandidateRecord) -> Result<EnforcementRecord, StoreError> {
        let record = EnforcementRecord::from_candidate(candidate);
        sqlx::query(
            r"
            INSERT INTO enforcement_records (id, agency, record_type, regulator_id, attrs, inserted_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(record.id.to_string())
        .bind(record.key.agency.code())
        .bind(record.key.record_type.code())
        .bind(&record.key.regulator_id)
        .bind(serde_json::to_string(&record.attrs)?)
        .bind(record.inserted_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update(
        &self,
        record: &EnforcementRecord,
        changes: &AttributeMap,
    ) -> Result<EnforcementRecord, StoreError> {
        // Patched in place so attributes written since `record` was read survive.
        // json_patch drops keys patched with null; changed_fields never yields null.
        let row = sqlx::query(
            r"
            UPDATE enforcement_records
            SET attrs = json_patch(attrs, ?), updated_at = ?
            WHERE id = ?
            RETURNING id, agency, record_type, regulator_id, attrs, inserted_at, updated_at
            ",
        )
        .bind(serde_json::to_string(changes)?)
        .bind(Utc::now().to_rfc3339())
        .bind(record.id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Self::row_to_record(&row)
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<EnforcementRecord>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, agency, record_type, regulator_id, attrs, inserted_at, updated_at
            FROM enforcement_records
            WHERE agency = ? AND record_type = ? AND regulator_id = ?
            ",
        )
        .bind(key.agency.code())
        .bind(key.record_type.code())
        .bind(&key.regulator_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }
}

/// Session snapshots, one row per session, replaced on every save
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO scrape_sessions (session_id, agency, record_type, status, snapshot, created_at, last_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
                status = excluded.status,
                snapshot = excluded.snapshot,
                last_updated_at = excluded.last_updated_at
            ",
        )
        .bind(&session.session_id)
        .bind(session.agency.code())
        .bind(session.record_type.code())
        .bind(session.status.as_str())
        .bind(serde_json::to_string(session)?)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT snapshot FROM scrape_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let snapshot: String = row.try_get("snapshot")?;
                Ok(Some(serde_json::from_str(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query("SELECT snapshot FROM scrape_sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<Session, StoreError> {
                let snapshot: String = row.try_get("snapshot")?;
                Ok(serde_json::from_str(&snapshot)?)
            })
            .collect()
    }
}

/// Append-only processing log rows
#[derive(Debug, Clone)]
pub struct SqliteProcessingLogStore {
    pool: SqlitePool,
}

impl SqliteProcessingLogStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &SqliteRow) -> Result<ProcessingLog, StoreError> {
        let id: String = row.try_get("id")?;
        let agency: String = row.try_get("agency")?;
        let record_type: String = row.try_get("record_type")?;
        let items: String = row.try_get("items")?;
        let batch_errors: String = row.try_get("batch_errors")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(ProcessingLog {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
            session_id: row.try_get("session_id")?,
            agency: parse_code(&agency)?,
            record_type: parse_code(&record_type)?,
            batch_number: read_count(row, "batch_number")?,
            tally: BatchTally {
                found: read_count(row, "items_found")?,
                created: read_count(row, "items_created")?,
                updated: read_count(row, "items_updated")?,
                existing: read_count(row, "items_existing")?,
                failed: read_count(row, "items_failed")?,
            },
            items: serde_json::from_str(&items)?,
            batch_errors: serde_json::from_str(&batch_errors)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ProcessingLogStore for SqliteProcessingLogStore {
    async fn append(&self, log: &ProcessingLog) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO processing_logs (
                id, session_id, agency, record_type, batch_number,
                items_found, items_created, items_updated, items_existing, items_failed,
                items, batch_errors, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(log.id.to_string())
        .bind(&log.session_id)
        .bind(log.agency.code())
        .bind(log.record_type.code())
        .bind(i64::from(log.batch_number))
        .bind(i64::from(log.tally.found))
        .bind(i64::from(log.tally.created))
        .bind(i64::from(log.tally.updated))
        .bind(i64::from(log.tally.existing))
        .bind(i64::from(log.tally.failed))
        .bind(serde_json::to_string(&log.items)?)
        .bind(serde_json::to_string(&log.batch_errors)?)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn for_session(&self, session_id: &str) -> Result<Vec<ProcessingLog>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, agency, record_type, batch_number,
                   items_found, items_created, items_updated, items_existing, items_failed,
                   items, batch_errors, created_at
            FROM processing_logs
            WHERE session_id = ?
            ORDER BY rowid
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_log).collect()
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! PostgreSQL pattern store binding
//!
//! Three tables: `success_patterns`, `pattern_usage_log`, and
//! `processed_events`. Counter updates run inside a transaction with a
//! row lock; the processed-events primary key is the idempotency
//! serialization point, and `ON CONFLICT DO NOTHING` turns duplicate
//! deliveries into SEEN.

use crate::errors::{NodeError, NodeResult};
use crate::identifiers::{EventId, PatternId};
use crate::patterns::model::{Pattern, PatternUsage, UsageOutcome};
use crate::stores::relational::PatternStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::warn;

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Connection string, e.g. `host=localhost user=intelligence`
    pub connection: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS success_patterns (
    pattern_id UUID PRIMARY KEY,
    payload JSONB NOT NULL,
    usage_count BIGINT NOT NULL DEFAULT 0,
    success_count BIGINT NOT NULL DEFAULT 0,
    failure_count BIGINT NOT NULL DEFAULT 0,
    active BOOLEAN NOT NULL DEFAULT TRUE
);
CREATE TABLE IF NOT EXISTS pattern_usage_log (
    id BIGSERIAL PRIMARY KEY,
    pattern_id UUID NOT NULL REFERENCES success_patterns(pattern_id) ON DELETE CASCADE,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS processed_events (
    event_id UUID PRIMARY KEY,
    processed_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS processed_events_processed_at_idx
    ON processed_events (processed_at);
";

/// Pattern store over a PostgreSQL server
pub struct PostgresPatternStore {
    client: Mutex<Client>,
}

impl PostgresPatternStore {
    /// Connect and ensure the schema exists
    pub async fn connect(config: PostgresConfig) -> NodeResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection, NoTls)
            .await
            .map_err(|e| NodeError::transient("postgres", e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection terminated");
            }
        });
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| NodeError::transient("postgres", e.to_string()))?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn db_err(e: tokio_postgres::Error) -> NodeError {
        NodeError::transient("postgres", e.to_string())
    }

    fn pattern_from_json(value: serde_json::Value) -> NodeResult<Pattern> {
        serde_json::from_value(value)
            .map_err(|e| NodeError::Internal(format!("stored pattern unreadable: {e}")))
    }
}

#[async_trait]
impl PatternStore for PostgresPatternStore {
    async fn insert_pattern(&self, pattern: Pattern) -> NodeResult<()> {
        let client = self.client.lock().await;
        let payload = serde_json::to_value(&pattern)?;
        client
            .execute(
                "INSERT INTO success_patterns \
                 (pattern_id, payload, usage_count, success_count, failure_count, active) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (pattern_id) DO UPDATE SET payload = EXCLUDED.payload",
                &[
                    &pattern.pattern_id.0,
                    &payload,
                    &(pattern.usage_count as i64),
                    &(pattern.success_count as i64),
                    &(pattern.failure_count as i64),
                    &pattern.active,
                ],
            )
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn get_pattern(&self, pattern_id: &PatternId) -> NodeResult<Option<Pattern>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT payload, usage_count, success_count, failure_count, active \
                 FROM success_patterns WHERE pattern_id = $1",
                &[&pattern_id.0],
            )
            .await
            .map_err(Self::db_err)?;
        match row {
            None => Ok(None),
            Some(row) => {
                let mut pattern = Self::pattern_from_json(row.get(0))?;
                pattern.usage_count = row.get::<_, i64>(1) as u64;
                pattern.success_count = row.get::<_, i64>(2) as u64;
                pattern.failure_count = row.get::<_, i64>(3) as u64;
                pattern.active = row.get(4);
                Ok(Some(pattern))
            }
        }
    }

    async fn active_patterns(&self, retention_floor: f32) -> NodeResult<Vec<Pattern>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT payload, usage_count, success_count, failure_count, active \
                 FROM success_patterns WHERE active ORDER BY pattern_id",
                &[],
            )
            .await
            .map_err(Self::db_err)?;
        let mut patterns = Vec::new();
        for row in rows {
            let mut pattern = Self::pattern_from_json(row.get(0))?;
            pattern.usage_count = row.get::<_, i64>(1) as u64;
            pattern.success_count = row.get::<_, i64>(2) as u64;
            pattern.failure_count = row.get::<_, i64>(3) as u64;
            pattern.active = row.get(4);
            if pattern.is_active(retention_floor) {
                patterns.push(pattern);
            }
        }
        Ok(patterns)
    }

    async fn record_usage(&self, usage: PatternUsage) -> NodeResult<Pattern> {
        let mut client = self.client.lock().await;
        let txn = client.transaction().await.map_err(Self::db_err)?;

        let row = txn
            .query_opt(
                "SELECT payload, usage_count, success_count, failure_count, active \
                 FROM success_patterns WHERE pattern_id = $1 FOR UPDATE",
                &[&usage.pattern_id.0],
            )
            .await
            .map_err(Self::db_err)?
            .ok_or_else(|| {
                NodeError::PreconditionViolated(format!(
                    "usage recorded for unknown pattern `{}`",
                    usage.pattern_id
                ))
            })?;

        let mut pattern = Self::pattern_from_json(row.get(0))?;
        pattern.usage_count = row.get::<_, i64>(1) as u64;
        pattern.success_count = row.get::<_, i64>(2) as u64;
        pattern.failure_count = row.get::<_, i64>(3) as u64;
        pattern.active = row.get(4);

        if usage.used {
            pattern.record_outcome(matches!(usage.outcome, UsageOutcome::Success));
            txn.execute(
                "UPDATE success_patterns \
                 SET usage_count = $2, success_count = $3, failure_count = $4 \
                 WHERE pattern_id = $1",
                &[
                    &usage.pattern_id.0,
                    &(pattern.usage_count as i64),
                    &(pattern.success_count as i64),
                    &(pattern.failure_count as i64),
                ],
            )
            .await
            .map_err(Self::db_err)?;
        }

        txn.execute(
            "INSERT INTO pattern_usage_log (pattern_id, payload, created_at) \
             VALUES ($1, $2, $3)",
            &[
                &usage.pattern_id.0,
                &serde_json::to_value(&usage)?,
                &usage.created_at,
            ],
        )
        .await
        .map_err(Self::db_err)?;

        txn.commit().await.map_err(Self::db_err)?;
        Ok(pattern)
    }

    async fn usage_log(&self, pattern_id: &PatternId) -> NodeResult<Vec<PatternUsage>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT payload FROM pattern_usage_log \
                 WHERE pattern_id = $1 ORDER BY id",
                &[&pattern_id.0],
            )
            .await
            .map_err(Self::db_err)?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row.get(0))
                    .map_err(|e| NodeError::Internal(format!("stored usage unreadable: {e}")))
            })
            .collect()
    }

    async fn prune_stale_patterns(
        &self,
        retention_floor: f32,
        observation_min_usages: u64,
    ) -> NodeResult<Vec<PatternId>> {
        let mut client = self.client.lock().await;
        let txn = client.transaction().await.map_err(Self::db_err)?;
        let mut touched = Vec::new();

        let removed = txn
            .query(
                "DELETE FROM success_patterns WHERE NOT active RETURNING pattern_id",
                &[],
            )
            .await
            .map_err(Self::db_err)?;
        for row in removed {
            touched.push(PatternId(row.get(0)));
        }

        let soft_deleted = txn
            .query(
                "UPDATE success_patterns SET active = FALSE \
                 WHERE active AND usage_count >= $1 \
                   AND success_count::float / GREATEST(usage_count, 1)::float < $2 \
                 RETURNING pattern_id",
                &[&(observation_min_usages as i64), &(retention_floor as f64)],
            )
            .await
            .map_err(Self::db_err)?;
        for row in soft_deleted {
            touched.push(PatternId(row.get(0)));
        }

        txn.commit().await.map_err(Self::db_err)?;
        touched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(touched)
    }

    async fn mark_processed(
        &self,
        event_id: EventId,
        processed_at: DateTime<Utc>,
    ) -> NodeResult<bool> {
        let client = self.client.lock().await;
        let inserted = client
            .execute(
                "INSERT INTO processed_events (event_id, processed_at) \
                 VALUES ($1, $2) ON CONFLICT (event_id) DO NOTHING",
                &[&event_id.0, &processed_at],
            )
            .await
            .map_err(Self::db_err)?;
        Ok(inserted == 1)
    }

    async fn is_processed(&self, event_id: &EventId) -> NodeResult<bool> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT 1 FROM processed_events WHERE event_id = $1",
                &[&event_id.0],
            )
            .await
            .map_err(Self::db_err)?;
        Ok(row.is_some())
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> NodeResult<usize> {
        let client = self.client.lock().await;
        let deleted = client
            .execute(
                "DELETE FROM processed_events WHERE processed_at < $1",
                &[&cutoff],
            )
            .await
            .map_err(Self::db_err)?;
        Ok(deleted as usize)
    }

    async fn processed_count(&self) -> NodeResult<usize> {
        let client = self.client.lock().await;
        let row = client
            .query_one("SELECT count(*) FROM processed_events", &[])
            .await
            .map_err(Self::db_err)?;
        Ok(row.get::<_, i64>(0) as usize)
    }
}

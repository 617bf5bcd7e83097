//! SQLite-backed long-term memory: pattern extraction, surprise-filtered
//! storage, full-text retrieval, and time-based decay.
//!
//! The store never fails a request — write-path errors are logged and
//! swallowed, and a failed retrieval yields an empty list.

pub mod extract;
pub mod fts;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

use switchboard_common::config::MemoryConfig;
use switchboard_common::ids::{MemoryId, SessionId};
use switchboard_common::types::memory::{MemoryRecord, MemoryType};

pub use extract::{extract_candidates, initial_importance, surprise_score};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory store connection error: {0}")]
    Connection(String),

    #[error("memory store query error: {0}")]
    Query(String),

    #[error("memory store migration error: {0}")]
    Migration(String),
}

impl From<MemoryError> for switchboard_common::GatewayError {
    fn from(e: MemoryError) -> Self {
        switchboard_common::GatewayError::Store(e.to_string())
    }
}

/// Retrieval filters.
#[derive(Clone, Debug, Default)]
pub struct MemoryFilter {
    pub memory_type: Option<MemoryType>,
    pub category: Option<String>,
    pub session_id: Option<SessionId>,
    pub min_importance: Option<f64>,
    pub limit: u32,
}

pub struct MemoryStore {
    pool: SqlitePool,
    config: MemoryConfig,
}

#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: String,
    session_id: Option<String>,
    content: String,
    memory_type: String,
    category: String,
    importance: f64,
    surprise_score: f64,
    access_count: i64,
    decay_factor: f64,
    source_turn_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    metadata: String,
}

impl MemoryRow {
    fn into_record(self) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::parse_str(&self.id)
                .map(MemoryId::from_uuid)
                .unwrap_or_default(),
            session_id: self.session_id.map(SessionId),
            content: self.content,
            memory_type: MemoryType::from_db_str(&self.memory_type)
                .unwrap_or(MemoryType::Fact),
            category: self.category,
            importance: self.importance,
            surprise_score: self.surprise_score,
            access_count: self.access_count,
            decay_factor: self.decay_factor,
            source_turn_id: self.source_turn_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_accessed_at: self.last_accessed_at,
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
        }
    }
}

const SELECT_COLUMNS: &str = "m.id, m.session_id, m.content, m.memory_type, m.category, \
     m.importance, m.surprise_score, m.access_count, m.decay_factor, m.source_turn_id, \
     m.created_at, m.updated_at, m.last_accessed_at, m.metadata";

impl MemoryStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn connect(db_path: &Path, config: MemoryConfig) -> Result<Self, MemoryError> {
        tracing::info!(path = %db_path.display(), "Opening memory store");

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            // WAL lets readers proceed while the single writer commits.
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Connection(e.to_string()))?;

        let store = Self { pool, config };
        store.migrate().await?;
        store.health_check().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<(), MemoryError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MemoryError::Migration(e.to_string()))
    }

    pub async fn health_check(&self) -> Result<(), MemoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Query(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Extract and store memories from assistant text. Never fails the
    /// caller: errors are logged and the stored count is best-effort.
    pub async fn remember(
        &self,
        session_id: Option<&SessionId>,
        assistant_text: &str,
        source_turn_id: Option<&str>,
    ) -> usize {
        match self
            .try_remember(session_id, assistant_text, source_turn_id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Memory extraction failed, continuing without");
                0
            }
        }
    }

    async fn try_remember(
        &self,
        session_id: Option<&SessionId>,
        assistant_text: &str,
        source_turn_id: Option<&str>,
    ) -> Result<usize, MemoryError> {
        let candidates = extract::extract_candidates(assistant_text);
        if candidates.is_empty() {
            return Ok(0);
        }

        let recent_any = self
            .recent_contents(session_id, None, self.config.dedup_lookback)
            .await?;

        let mut stored = 0usize;
        for candidate in candidates {
            // Insert-time dedup against the last K session memories.
            let normalized = extract::normalize(&candidate.content);
            if recent_any.iter().any(|c| extract::normalize(c) == normalized) {
                tracing::debug!(content = %candidate.content, "Dropping duplicate memory");
                continue;
            }

            let priors = self
                .recent_contents(
                    session_id,
                    Some(candidate.memory_type),
                    self.config.recent_window,
                )
                .await?;
            let surprise = extract::surprise_score(&candidate.content, &priors);
            if surprise < self.config.surprise_threshold {
                tracing::debug!(
                    surprise,
                    threshold = self.config.surprise_threshold,
                    "Dropping unsurprising memory candidate"
                );
                continue;
            }

            let importance = extract::initial_importance(candidate.memory_type, surprise);
            self.insert(
                session_id,
                &candidate.content,
                candidate.memory_type,
                importance,
                surprise,
                source_turn_id,
            )
            .await?;
            stored += 1;
        }

        if stored > 0 {
            metrics::counter!("memory.stored").increment(stored as u64);
        }
        Ok(stored)
    }

    async fn insert(
        &self,
        session_id: Option<&SessionId>,
        content: &str,
        memory_type: MemoryType,
        importance: f64,
        surprise: f64,
        source_turn_id: Option<&str>,
    ) -> Result<MemoryId, MemoryError> {
        let id = MemoryId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO memories (id, session_id, content, memory_type, category,
                                  importance, surprise_score, access_count, decay_factor,
                                  source_turn_id, created_at, updated_at, last_accessed_at,
                                  metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 1.0, ?8, ?9, ?9, ?9, '{}')
            "#,
        )
        .bind(id.to_string())
        .bind(session_id.map(|s| s.as_str().to_string()))
        .bind(content)
        .bind(memory_type.as_db_str())
        .bind("general")
        .bind(importance.clamp(0.0, 1.0))
        .bind(surprise.clamp(0.0, 1.0))
        .bind(source_turn_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Query(e.to_string()))?;

        Ok(id)
    }

    /// Most recent memory contents for a session, optionally filtered by
    /// type, newest first.
    async fn recent_contents(
        &self,
        session_id: Option<&SessionId>,
        memory_type: Option<MemoryType>,
        limit: u32,
    ) -> Result<Vec<String>, MemoryError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT content FROM memories WHERE 1=1");

        match session_id {
            Some(session) => {
                builder.push(" AND session_id = ");
                builder.push_bind(session.as_str().to_string());
            }
            None => {
                builder.push(" AND session_id IS NULL");
            }
        }
        if let Some(memory_type) = memory_type {
            builder.push(" AND memory_type = ");
            builder.push_bind(memory_type.as_db_str());
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("content"))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Full-text retrieval. Ordered by FTS rank then importance; each hit's
    /// access count and last-access timestamp are bumped.
    pub async fn search(
        &self,
        query: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let Some(sanitized) = fts::sanitize_query(query) else {
            return Ok(Vec::new());
        };

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM memories_fts JOIN memories m ON m.rowid = memories_fts.rowid \
             WHERE memories_fts MATCH ",
            SELECT_COLUMNS
        ));
        builder.push_bind(sanitized);

        if let Some(memory_type) = filter.memory_type {
            builder.push(" AND m.memory_type = ");
            builder.push_bind(memory_type.as_db_str());
        }
        if let Some(category) = &filter.category {
            builder.push(" AND m.category = ");
            builder.push_bind(category.clone());
        }
        if let Some(session) = &filter.session_id {
            builder.push(" AND m.session_id = ");
            builder.push_bind(session.as_str().to_string());
        }
        if let Some(min) = filter.min_importance {
            builder.push(" AND m.importance >= ");
            builder.push_bind(min);
        }

        let limit = if filter.limit == 0 { 20 } else { filter.limit };
        builder.push(" ORDER BY memories_fts.rank, m.importance DESC LIMIT ");
        builder.push_bind(limit as i64);

        let rows: Vec<MemoryRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::Query(e.to_string()))?;

        let now = Utc::now();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = row.into_record();
            record.decay_factor = decay_for(record.last_accessed_at, now, &self.config);
            self.touch(&record.id, now).await?;
            record.access_count += 1;
            record.last_accessed_at = now;
            records.push(record);
        }

        metrics::counter!("memory.retrievals").increment(1);
        Ok(records)
    }

    /// Retrieval that never fails: errors yield an empty list.
    pub async fn retrieve(&self, query: &str, filter: &MemoryFilter) -> Vec<MemoryRecord> {
        match self.search(query, filter).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Memory retrieval failed, returning nothing");
                Vec::new()
            }
        }
    }

    /// Top-k session memories formatted for system-prompt injection.
    pub async fn context_for(&self, session_id: &SessionId, query: &str) -> Option<String> {
        let filter = MemoryFilter {
            session_id: Some(session_id.clone()),
            limit: self.config.inject_top_k,
            ..Default::default()
        };
        let records = self.retrieve(query, &filter).await;
        if records.is_empty() {
            return None;
        }

        let mut context = String::from("Relevant context from memory:\n");
        for record in &records {
            context.push_str("- [");
            context.push_str(record.memory_type.as_db_str());
            context.push_str("] ");
            context.push_str(&record.content);
            context.push('\n');
        }
        Some(context)
    }

    async fn touch(&self, id: &MemoryId, now: DateTime<Utc>) -> Result<(), MemoryError> {
        sqlx::query(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 \
             WHERE id = ?2",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Query(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Bulk decay recompute plus eviction of aged-out, low-scoring, and
    /// over-count records. Returns (updated, evicted).
    pub async fn run_maintenance(&self) -> Result<(u64, u64), MemoryError> {
        let now = Utc::now();
        let mut updated = 0u64;
        let mut evicted = 0u64;

        // Age-based eviction first.
        let cutoff = now - Duration::days(self.config.max_age_days as i64);
        let result = sqlx::query("DELETE FROM memories WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Query(e.to_string()))?;
        evicted += result.rows_affected();

        // Recompute decay and drop records below the effective-score floor.
        let rows = sqlx::query(
            "SELECT id, importance, decay_factor, last_accessed_at FROM memories",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::Query(e.to_string()))?;

        for row in rows {
            let id: String = row.get("id");
            let importance: f64 = row.get("importance");
            let stored_decay: f64 = row.get("decay_factor");
            let last_accessed: DateTime<Utc> = row.get("last_accessed_at");

            // Decay only moves down between accesses.
            let decay = decay_for(last_accessed, now, &self.config).min(stored_decay);

            if importance * decay < self.config.min_effective_score {
                sqlx::query("DELETE FROM memories WHERE id = ?1")
                    .bind(&id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| MemoryError::Query(e.to_string()))?;
                evicted += 1;
            } else if (decay - stored_decay).abs() > 1e-4 {
                sqlx::query(
                    "UPDATE memories SET decay_factor = ?1, updated_at = ?2 WHERE id = ?3",
                )
                .bind(decay)
                .bind(now)
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::Query(e.to_string()))?;
                updated += 1;
            }
        }

        // Cap total count, oldest out first.
        let result = sqlx::query(
            "DELETE FROM memories WHERE id NOT IN \
             (SELECT id FROM memories ORDER BY created_at DESC LIMIT ?1)",
        )
        .bind(self.config.max_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Query(e.to_string()))?;
        evicted += result.rows_affected();

        if updated > 0 || evicted > 0 {
            tracing::info!(updated, evicted, "Memory maintenance pass complete");
        }
        metrics::counter!("memory.evictions").increment(evicted);
        Ok((updated, evicted))
    }

    /// Background task running maintenance on the configured interval.
    pub fn spawn_maintenance(store: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_minutes = store.config.maintenance_interval_minutes.max(1);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_secs(interval_minutes as u64 * 60);
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = store.run_maintenance().await {
                    tracing::warn!(error = %e, "Memory maintenance failed");
                }
            }
        })
    }
}

/// 0.5^(age_days / half_life), where age counts from the last access.
fn decay_for(last_accessed: DateTime<Utc>, now: DateTime<Utc>, config: &MemoryConfig) -> f64 {
    let age_days = (now - last_accessed).num_seconds().max(0) as f64 / 86_400.0;
    0.5f64.powf(age_days / config.decay_half_life_days)
}

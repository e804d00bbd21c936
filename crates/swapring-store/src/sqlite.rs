//! Embedded SQLite backend
//!
//! Per-resource tables keyed to match the in-memory map IDs; journal
//! tables keep insertion order through an explicit `seq` column. Rows
//! hold the record's JSON body, so reads hydrate into the same logical
//! tree the snapshot backend produces.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use tracing::info;

use crate::{AppState, StatePersistence, StoreError, StoreResult, TenancyIndex};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS intents (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS proposals (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS commits (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS timelines (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS receipts (seq INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS vault_holdings (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS vault_custody_snapshots (seq INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS events (seq INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS webhook_seen (event_id TEXT PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS idempotency (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS delegations (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS partner_program (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS partner_program_usage (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS policy_audit (seq INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS rollout_policy_audit (seq INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS export_checkpoints (kind TEXT NOT NULL, seq INTEGER NOT NULL, body TEXT NOT NULL, PRIMARY KEY (kind, seq))",
    "CREATE TABLE IF NOT EXISTS tenancy_proposals (id TEXT PRIMARY KEY, partner_id TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS tenancy_cycles (id TEXT PRIMARY KEY, partner_id TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
];

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `path`
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let backend = Self { pool };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Read a marker row from the meta table
    pub async fn meta_get(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Write a marker row into the meta table
    pub async fn meta_set(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        for table in ["intents", "receipts", "events", "idempotency", "webhook_seen"] {
            let (count,): (i64,) =
                sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                    .fetch_one(&self.pool)
                    .await?;
            if count > 0 {
                return Ok(false);
            }
        }
        Ok(self.meta_get("state_saved_at").await?.is_none())
    }
}

async fn replace_keyed<T: Serialize>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    rows: impl Iterator<Item = (String, T)>,
) -> StoreResult<()> {
    sqlx::query(&format!("DELETE FROM {table}"))
        .execute(&mut **tx)
        .await?;
    for (id, record) in rows {
        let body = serde_json::to_string(&record)?;
        sqlx::query(&format!("INSERT INTO {table} (id, body) VALUES (?1, ?2)"))
            .bind(id)
            .bind(body)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn replace_journal<T: Serialize>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    rows: &[T],
) -> StoreResult<()> {
    sqlx::query(&format!("DELETE FROM {table}"))
        .execute(&mut **tx)
        .await?;
    for (seq, record) in rows.iter().enumerate() {
        let body = serde_json::to_string(record)?;
        sqlx::query(&format!("INSERT INTO {table} (seq, body) VALUES (?1, ?2)"))
            .bind(seq as i64)
            .bind(body)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn load_keyed<K, T>(pool: &SqlitePool, table: &str) -> StoreResult<std::collections::BTreeMap<K, T>>
where
    K: From<String> + Ord,
    T: DeserializeOwned,
{
    let rows: Vec<(String, String)> =
        sqlx::query_as(&format!("SELECT id, body FROM {table} ORDER BY id"))
            .fetch_all(pool)
            .await?;
    let mut map = std::collections::BTreeMap::new();
    for (id, body) in rows {
        let record: T = serde_json::from_str(&body)
            .map_err(|e| StoreError::Corrupt(format!("{table} row {id}: {e}")))?;
        map.insert(K::from(id), record);
    }
    Ok(map)
}

async fn load_journal<T: DeserializeOwned>(pool: &SqlitePool, table: &str) -> StoreResult<Vec<T>> {
    let rows: Vec<(String,)> =
        sqlx::query_as(&format!("SELECT body FROM {table} ORDER BY seq"))
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|(body,)| {
            serde_json::from_str(&body)
                .map_err(|e| StoreError::Corrupt(format!("{table} row: {e}")))
        })
        .collect()
}

#[async_trait]
impl StatePersistence for SqliteBackend {
    async fn load(&self) -> StoreResult<Option<AppState>> {
        if self.is_empty().await? {
            return Ok(None);
        }

        let pool = &self.pool;
        let mut state = AppState {
            intents: load_keyed(pool, "intents").await?,
            proposals: load_keyed(pool, "proposals").await?,
            commits: load_keyed(pool, "commits").await?,
            timelines: load_keyed(pool, "timelines").await?,
            receipts: load_journal(pool, "receipts").await?,
            vault_holdings: load_keyed(pool, "vault_holdings").await?,
            vault_custody_snapshots: load_journal(pool, "vault_custody_snapshots").await?,
            events: load_journal(pool, "events").await?,
            idempotency: load_keyed(pool, "idempotency").await?,
            delegations: load_keyed(pool, "delegations").await?,
            partner_program: load_keyed(pool, "partner_program").await?,
            partner_program_usage: load_keyed(pool, "partner_program_usage").await?,
            policy_audit: load_journal(pool, "policy_audit").await?,
            rollout_policy_audit: load_journal(pool, "rollout_policy_audit").await?,
            ..Default::default()
        };

        let seen: Vec<(String,)> = sqlx::query_as("SELECT event_id FROM webhook_seen")
            .fetch_all(pool)
            .await?;
        state.webhook_seen = seen.into_iter().map(|(id,)| id).collect();

        let checkpoints: Vec<(String, String)> =
            sqlx::query_as("SELECT kind, body FROM export_checkpoints ORDER BY kind, seq")
                .fetch_all(pool)
                .await?;
        for (kind, body) in checkpoints {
            let row = serde_json::from_str(&body)
                .map_err(|e| StoreError::Corrupt(format!("export_checkpoints {kind}: {e}")))?;
            state.export_checkpoints.entry(kind).or_default().push(row);
        }

        let mut tenancy = TenancyIndex::default();
        let proposals: Vec<(String, String)> =
            sqlx::query_as("SELECT id, partner_id FROM tenancy_proposals")
                .fetch_all(pool)
                .await?;
        tenancy.proposals = proposals
            .into_iter()
            .map(|(id, partner)| (id.into(), partner))
            .collect();
        let cycles: Vec<(String, String)> =
            sqlx::query_as("SELECT id, partner_id FROM tenancy_cycles")
                .fetch_all(pool)
                .await?;
        tenancy.cycles = cycles
            .into_iter()
            .map(|(id, partner)| (id.into(), partner))
            .collect();
        state.tenancy = tenancy;

        Ok(Some(state))
    }

    async fn save(&self, state: &AppState) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        replace_keyed(
            &mut tx,
            "intents",
            state.intents.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "proposals",
            state.proposals.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "commits",
            state.commits.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "timelines",
            state.timelines.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_journal(&mut tx, "receipts", &state.receipts).await?;
        replace_keyed(
            &mut tx,
            "vault_holdings",
            state.vault_holdings.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_journal(&mut tx, "vault_custody_snapshots", &state.vault_custody_snapshots)
            .await?;
        replace_journal(&mut tx, "events", &state.events).await?;
        replace_keyed(
            &mut tx,
            "idempotency",
            state.idempotency.iter().map(|(k, v)| (k.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "delegations",
            state.delegations.iter().map(|(k, v)| (k.0.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "partner_program",
            state.partner_program.iter().map(|(k, v)| (k.clone(), v)),
        )
        .await?;
        replace_keyed(
            &mut tx,
            "partner_program_usage",
            state
                .partner_program_usage
                .iter()
                .map(|(k, v)| (k.clone(), v)),
        )
        .await?;
        replace_journal(&mut tx, "policy_audit", &state.policy_audit).await?;
        replace_journal(&mut tx, "rollout_policy_audit", &state.rollout_policy_audit).await?;

        sqlx::query("DELETE FROM webhook_seen")
            .execute(&mut *tx)
            .await?;
        for event_id in &state.webhook_seen {
            sqlx::query("INSERT INTO webhook_seen (event_id) VALUES (?1)")
                .bind(event_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM export_checkpoints")
            .execute(&mut *tx)
            .await?;
        for (kind, rows) in &state.export_checkpoints {
            for (seq, row) in rows.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO export_checkpoints (kind, seq, body) VALUES (?1, ?2, ?3)",
                )
                .bind(kind)
                .bind(seq as i64)
                .bind(serde_json::to_string(row)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("DELETE FROM tenancy_proposals")
            .execute(&mut *tx)
            .await?;
        for (id, partner) in &state.tenancy.proposals {
            sqlx::query("INSERT INTO tenancy_proposals (id, partner_id) VALUES (?1, ?2)")
                .bind(&id.0)
                .bind(partner)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM tenancy_cycles")
            .execute(&mut *tx)
            .await?;
        for (id, partner) in &state.tenancy.cycles {
            sqlx::query("INSERT INTO tenancy_cycles (id, partner_id) VALUES (?1, ?2)")
                .bind(&id.0)
                .bind(partner)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO meta (key, value) VALUES ('state_saved_at', ?1) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("state saved to sqlite");
        Ok(())
    }
}

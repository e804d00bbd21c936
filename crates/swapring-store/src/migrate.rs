//! json → sqlite state migration
//!
//! Reads the JSON snapshot, re-upserts every known top-level key into
//! the per-resource tables, and writes a marker row. Re-running
//! against an already-migrated target requires `--force`.

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::{
    JsonSnapshotBackend, SqliteBackend, StatePersistence, StoreError, StoreResult,
};

const MIGRATION_MARKER: &str = "migrated_from_json";

/// Summary of a completed migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub from_state_file: String,
    pub to_state_file: String,
    pub intents: usize,
    pub proposals: usize,
    pub timelines: usize,
    pub receipts: usize,
    pub vault_holdings: usize,
    pub events: usize,
    pub idempotency_records: usize,
    pub delegations: usize,
    pub forced: bool,
}

/// Migrate a JSON snapshot into a SQLite state file
pub async fn migrate_json_to_sqlite(
    from: &Path,
    to: &Path,
    force: bool,
) -> StoreResult<MigrationReport> {
    let source = JsonSnapshotBackend::new(from);
    let state = source.load().await?.ok_or_else(|| {
        StoreError::Migration(format!("source state file not found: {}", from.display()))
    })?;

    let target = SqliteBackend::open(to).await?;
    if target.meta_get(MIGRATION_MARKER).await?.is_some() && !force {
        return Err(StoreError::Migration(format!(
            "target {} already migrated; pass --force to overwrite",
            to.display()
        )));
    }

    target.save(&state).await?;
    target
        .meta_set(
            MIGRATION_MARKER,
            &format!("{}@{}", from.display(), chrono::Utc::now().to_rfc3339()),
        )
        .await?;

    info!(from = %from.display(), to = %to.display(), "json state migrated to sqlite");

    Ok(MigrationReport {
        from_state_file: from.display().to_string(),
        to_state_file: to.display().to_string(),
        intents: state.intents.len(),
        proposals: state.proposals.len(),
        timelines: state.timelines.len(),
        receipts: state.receipts.len(),
        vault_holdings: state.vault_holdings.len(),
        events: state.events.len(),
        idempotency_records: state.idempotency.len(),
        delegations: state.delegations.len(),
        forced: force,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use std::path::PathBuf;

    fn temp(name: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "swapring_migrate_{}_{}.{}",
            name,
            std::process::id(),
            ext
        ))
    }

    #[tokio::test]
    async fn test_migration_roundtrip_and_force_gate() {
        let json_path = temp("src", "json");
        let db_path = temp("dst", "db");
        let _ = std::fs::remove_file(&db_path);

        let source = JsonSnapshotBackend::new(&json_path);
        let mut state = AppState::default();
        state.webhook_seen.insert("evt_1".to_string());
        source.save(&state).await.unwrap();

        let report = migrate_json_to_sqlite(&json_path, &db_path, false)
            .await
            .unwrap();
        assert_eq!(report.intents, 0);

        // Second run without --force is refused.
        assert!(migrate_json_to_sqlite(&json_path, &db_path, false)
            .await
            .is_err());

        // --force re-runs.
        let report = migrate_json_to_sqlite(&json_path, &db_path, true)
            .await
            .unwrap();
        assert!(report.forced);

        let target = SqliteBackend::open(&db_path).await.unwrap();
        let loaded = target.load().await.unwrap().unwrap();
        assert!(loaded.webhook_seen.contains("evt_1"));

        let _ = std::fs::remove_file(&json_path);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let missing = temp("missing", "json");
        let db_path = temp("dst2", "db");
        assert!(migrate_json_to_sqlite(&missing, &db_path, false)
            .await
            .is_err());
        let _ = std::fs::remove_file(&db_path);
    }
}

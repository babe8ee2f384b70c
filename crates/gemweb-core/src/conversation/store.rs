//! Durable conversation store
//!
//! One embedded SQLite file per account holds three keyspaces: account
//! metadata, conversation records, and the prefix index. Saves are full
//! snapshot replacements done in a single transaction; loads tolerate
//! malformed values by skipping them. The file is opened and closed per
//! operation, with a short busy timeout so a concurrent writer surfaces as
//! a storage error instead of blocking indefinitely.

use super::message::ConversationRecord;
use crate::error::{GemWebError, GemWebResult};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOAD_TIMEOUT: Duration = Duration::from_secs(1);
const SAVE_TIMEOUT: Duration = Duration::from_secs(2);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS account_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conv_items (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conv_index (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Storage file path for an account's conversation data
///
/// `<cwd>/conv/<basename-of-token-file-without-extension>.db`
pub fn conv_db_path(token_file_path: &str) -> PathBuf {
    let wd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base = Path::new(token_file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(token_file_path);
    wd.join("conv").join(format!("{}.db", base))
}

// Owner-RWX, world-readable; never world-writable regardless of umask.
fn ensure_store_dir(parent: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(parent)
}

fn open_conn(path: &Path, timeout: Duration) -> GemWebResult<Connection> {
    if let Some(parent) = path.parent() {
        ensure_store_dir(parent).map_err(|e| {
            GemWebError::io_with_path(e.to_string(), parent.display().to_string())
        })?;
    }
    let conn = Connection::open(path).map_err(|e| {
        GemWebError::storage_with_path(e.to_string(), path.display().to_string())
    })?;
    conn.busy_timeout(timeout)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Load the account-level metadata keyspace
pub fn load_store(path: &Path) -> GemWebResult<HashMap<String, Vec<String>>> {
    let conn = open_conn(path, LOAD_TIMEOUT)?;
    let mut out = HashMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM account_meta")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (key, value) = row?;
        match serde_json::from_str::<Vec<String>>(&value) {
            Ok(arr) => {
                out.insert(key, arr);
            }
            Err(_) => {
                // Skip malformed entries instead of failing the whole load.
                tracing::debug!(key = %key, "skipping malformed account metadata entry");
            }
        }
    }
    Ok(out)
}

/// Replace the account-level metadata keyspace with the given snapshot
pub fn save_store(path: &Path, data: &HashMap<String, Vec<String>>) -> GemWebResult<()> {
    let mut conn = open_conn(path, SAVE_TIMEOUT)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM account_meta", [])?;
    {
        let mut stmt = tx.prepare("INSERT INTO account_meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in data {
            let encoded = serde_json::to_string(value)?;
            stmt.execute(rusqlite::params![key, encoded])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load the conversation records and their prefix index
#[allow(clippy::type_complexity)]
pub fn load_data(
    path: &Path,
) -> GemWebResult<(HashMap<String, ConversationRecord>, HashMap<String, String>)> {
    let conn = open_conn(path, LOAD_TIMEOUT)?;

    let mut items = HashMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM conv_items")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (key, value) = row?;
        match serde_json::from_str::<ConversationRecord>(&value) {
            Ok(rec) => {
                items.insert(key, rec);
            }
            Err(_) => {
                tracing::debug!(key = %key, "skipping malformed conversation record");
            }
        }
    }
    drop(stmt);

    let mut index = HashMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM conv_index")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (key, value) = row?;
        index.insert(key, value);
    }

    Ok((items, index))
}

/// Replace the record and index keyspaces with the given snapshots in one
/// transaction
pub fn save_data(
    path: &Path,
    items: &HashMap<String, ConversationRecord>,
    index: &HashMap<String, String>,
) -> GemWebResult<()> {
    let mut conn = open_conn(path, SAVE_TIMEOUT)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM conv_items", [])?;
    tx.execute("DELETE FROM conv_index", [])?;
    {
        let mut stmt = tx.prepare("INSERT INTO conv_items (key, value) VALUES (?1, ?2)")?;
        for (key, rec) in items {
            let encoded = serde_json::to_string(rec)?;
            stmt.execute(rusqlite::params![key, encoded])?;
        }
    }
    {
        let mut stmt = tx.prepare("INSERT INTO conv_index (key, value) VALUES (?1, ?2)")?;
        for (key, value) in index {
            stmt.execute(rusqlite::params![key, value])?;
        }
    }
    tx.commit()?;
    Ok(())
}

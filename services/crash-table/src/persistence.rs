//! SQLite backend for the ledger.
//!
//! Every record lives in one `state` table as a codec-encoded key/value pair. Each
//! [`State::apply`] batch runs in a single SQL transaction, which gives the ledger the atomic
//! batch it relies on.

use anyhow::{Context, Result};
use commonware_codec::{DecodeExt, Encode};
use crashpad_execution::{State, Status};
use crashpad_types::execution::{Key, Value};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

pub struct SqliteState {
    conn: Connection,
}

impl SqliteState {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger database {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ledger database")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS state (
             key BLOB PRIMARY KEY,
             value BLOB NOT NULL
         );",
    )
    .context("init ledger schema")?;
    Ok(())
}

fn decode_record(key: &[u8], value: &[u8]) -> Result<(Key, Value)> {
    let key = Key::decode(key).context("decode state key")?;
    let value = Value::decode(value).with_context(|| format!("decode state value for {key:?}"))?;
    Ok((key, value))
}

impl State for SqliteState {
    fn load(&self) -> Result<Vec<(Key, Value)>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (key, value) = row?;
            records.push(decode_record(&key, &value)?);
        }
        debug!(records = records.len(), "loaded ledger state");
        Ok(records)
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM state WHERE key = ?1",
                params![key.encode().to_vec()],
                |row| row.get(0),
            )
            .optional()?;
        bytes
            .map(|bytes| Value::decode(bytes.as_slice()).context("decode state value"))
            .transpose()
    }

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("begin state transaction")?;
        {
            let mut upsert =
                tx.prepare_cached("INSERT OR REPLACE INTO state (key, value) VALUES (?1, ?2)")?;
            let mut delete = tx.prepare_cached("DELETE FROM state WHERE key = ?1")?;
            for (key, status) in changes {
                let key = key.encode().to_vec();
                match status {
                    Status::Update(value) => {
                        upsert.execute(params![key, value.encode().to_vec()])?;
                    }
                    Status::Delete => {
                        delete.execute(params![key])?;
                    }
                }
            }
        }
        tx.commit().context("commit state transaction")?;
        Ok(())
    }
}

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chime_core::timefmt::utcnow;

use crate::error::Result;
use crate::types::Timer;

/// Fixed-width ISO-8601 so stored text compares lexicographically in SQL.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Initialise the timer schema in `conn`.
///
/// Creates the `timers` table (idempotent) and an index on `expires` so the
/// next-due query stays efficient with thousands of pending timers.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS timers (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            event   TEXT NOT NULL,
            extra   TEXT NOT NULL,   -- JSON document {args, kwargs}
            expires TEXT NOT NULL,   -- naive-UTC ISO-8601
            created TEXT NOT NULL    -- naive-UTC ISO-8601
        ) STRICT;

        -- Next-due polling: SELECT ... WHERE expires < ? ORDER BY expires LIMIT 1
        CREATE INDEX IF NOT EXISTS idx_timers_expires ON timers (expires);
        ",
    )?;
    Ok(())
}

/// Serialised form of the `extra` column.
#[derive(Serialize, Deserialize)]
struct Extra {
    args: Vec<Value>,
    kwargs: Map<String, Value>,
}

/// Durable CRUD over the pending-timer table.
///
/// Wraps one connection behind a mutex so the scheduling handle and the
/// dispatch loop can share it; every critical section is a single statement.
#[derive(Clone)]
pub struct TimerStore {
    conn: Arc<Mutex<Connection>>,
}

impl TimerStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert one pending timer, returning the store-assigned id.
    pub fn insert(
        &self,
        event: &str,
        args: &[Value],
        kwargs: &Map<String, Value>,
        expires: NaiveDateTime,
        created: NaiveDateTime,
    ) -> Result<i64> {
        let extra = serde_json::to_string(&Extra {
            args: args.to_vec(),
            kwargs: kwargs.clone(),
        })?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO timers (event, extra, expires, created) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![event, extra, fmt_ts(expires), fmt_ts(created)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The earliest timer due within `horizon_days` of now, or `None`.
    ///
    /// Ordering between timers with equal expiries is arbitrary.
    pub fn fetch_next_due(&self, horizon_days: i64) -> Result<Option<Timer>> {
        let cutoff = fmt_ts(utcnow() + chrono::Duration::days(horizon_days));
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, event, extra, expires, created FROM timers
             WHERE expires < ?1 ORDER BY expires LIMIT 1",
        )?;
        let row = stmt.query_row([&cutoff], row_tuple).optional()?;
        row.map(decode_row).transpose()
    }

    /// Delete by id. Idempotent: returns the number of rows removed (0 or 1).
    pub fn delete(&self, id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM timers WHERE id = ?1", [id])?)
    }

    /// Owner-scoped delete used by user-initiated cancellation.
    ///
    /// Constrains the event name and the first positional arg (the owner
    /// identity, by convention) so one user cannot cancel another's timer.
    pub fn delete_scoped(&self, id: i64, event: &str, owner: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "DELETE FROM timers
             WHERE id = ?1 AND event = ?2
               AND CAST(json_extract(extra, '$.args[0]') AS TEXT) = ?3",
            rusqlite::params![id, event, owner],
        )?)
    }

    /// Pending timers for one owner and event, soonest first.
    pub fn list_scoped(&self, event: &str, owner: &str, limit: u32) -> Result<Vec<Timer>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, event, extra, expires, created FROM timers
             WHERE event = ?1 AND CAST(json_extract(extra, '$.args[0]') AS TEXT) = ?2
             ORDER BY expires LIMIT ?3",
        )?;
        let rows: Vec<RowTuple> = stmt
            .query_map(rusqlite::params![event, owner, limit], row_tuple)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Fetch one timer by id.
    pub fn get(&self, id: i64) -> Result<Option<Timer>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, event, extra, expires, created FROM timers WHERE id = ?1",
                [id],
                row_tuple,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// Number of pending rows.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM timers", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

type RowTuple = (i64, String, String, String, String);

fn row_tuple(row: &Row<'_>) -> rusqlite::Result<RowTuple> {
    Ok((
        row.get(0)?, // id
        row.get(1)?, // event
        row.get(2)?, // extra JSON
        row.get(3)?, // expires
        row.get(4)?, // created
    ))
}

fn decode_row((id, event, extra, expires, created): RowTuple) -> Result<Timer> {
    let extra: Extra = serde_json::from_str(&extra)?;
    Ok(Timer {
        id: Some(id),
        event,
        args: extra.args,
        kwargs: extra.kwargs,
        expires: parse_ts(&expires)?,
        created: parse_ts(&created)?,
    })
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(s: &str) -> Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?)
}

//! SQLite persistence layer for the settlement engine.
//!
//! One handle (`SettlementDb`) owns the connection behind a tokio mutex and
//! is cloned into every component that needs it, so tests can point the
//! whole engine at a throwaway database file.
//!
//! Upstream facts (agents, wagers, payments, collections, draw results) are
//! written by external processes and only read here; the engine's own output
//! is the `daily_summaries` table, written through a field-merge upsert so
//! overlapping batch and event-mode writes stay convergent.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{Agent, DailySummary, RawDrawRecord, Wager, WagerSelection};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    commission_pct REAL NOT NULL,
    module INTEGER NOT NULL,
    position INTEGER NOT NULL
);

-- placed_at is local time, '%Y-%m-%dT%H:%M:%S', so the per-day range scan
-- works with plain text comparison.
CREATE TABLE IF NOT EXISTS wagers (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    placed_at TEXT NOT NULL,
    total_amount REAL NOT NULL,
    voided INTEGER,
    selections_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wagers_agent_placed
    ON wagers(agent_id, placed_at);

-- Cash amounts are kept as the operator-entered text and parsed on read;
-- unparseable values settle as 0.
CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    date TEXT NOT NULL,
    amount TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(date);

CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    date TEXT NOT NULL,
    amount TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_date ON collections(date);

CREATE TABLE IF NOT EXISTS draw_results (
    date TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_summaries (
    agent_id TEXT NOT NULL,
    date TEXT NOT NULL,
    prior_balance REAL NOT NULL,
    wagered REAL NOT NULL,
    commission REAL NOT NULL,
    prizes REAL NOT NULL,
    day_movement REAL NOT NULL,
    new_balance REAL NOT NULL,
    payments REAL NOT NULL,
    collections REAL NOT NULL,
    module INTEGER NOT NULL,
    position INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (agent_id, date)
);

CREATE INDEX IF NOT EXISTS idx_summaries_date
    ON daily_summaries(date, module, position);
"#;

/// Parse an operator-entered cash amount. Non-numeric text settles as 0
/// rather than failing the whole read.
fn parse_amount(raw: &str, table: &str, id: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            warn!(table, id, raw, "unparseable amount, defaulting to 0");
            0.0
        }
    }
}

#[derive(Clone)]
pub struct SettlementDb {
    conn: Arc<Mutex<Connection>>,
}

impl SettlementDb {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open settlement db")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("apply settlement schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ===== Agents =====

    pub async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO agents (id, name, commission_pct, module, position)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                commission_pct = excluded.commission_pct,
                module = excluded.module,
                position = excluded.position",
            params![
                &agent.id,
                &agent.name,
                agent.commission_pct,
                agent.module,
                agent.position
            ],
        )
        .context("upsert agent")?;
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, commission_pct, module, position
             FROM agents ORDER BY module ASC, position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Agent {
                id: row.get(0)?,
                name: row.get(1)?,
                commission_pct: row.get(2)?,
                module: row.get(3)?,
                position: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r.context("read agent row")?);
        }
        Ok(out)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, commission_pct, module, position
             FROM agents WHERE id = ?1",
        )?;
        stmt.query_row(params![agent_id], |row| {
            Ok(Agent {
                id: row.get(0)?,
                name: row.get(1)?,
                commission_pct: row.get(2)?,
                module: row.get(3)?,
                position: row.get(4)?,
            })
        })
        .optional()
        .context("read agent")
    }

    // ===== Wagers =====

    pub async fn insert_wager(&self, wager: &Wager) -> Result<()> {
        let selections_json =
            serde_json::to_string(&wager.selections).context("serialize selections")?;
        let voided = wager.voided.map(|v| v as i64);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO wagers
             (id, agent_id, placed_at, total_amount, voided, selections_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &wager.id,
                &wager.agent_id,
                &wager.placed_at,
                wager.total_amount,
                voided,
                selections_json
            ],
        )
        .context("insert wager")?;
        Ok(())
    }

    /// All wagers one agent placed within `[startOfDay, endOfDay]` of `date`.
    pub async fn wagers_for_day(&self, agent_id: &str, date: NaiveDate) -> Result<Vec<Wager>> {
        let start = format!("{date}T00:00:00");
        let end = format!("{date}T23:59:59");
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, placed_at, total_amount, voided, selections_json
             FROM wagers
             WHERE agent_id = ?1 AND placed_at >= ?2 AND placed_at <= ?3
             ORDER BY placed_at ASC",
        )?;
        let rows = stmt.query_map(params![agent_id, start, end], |row| {
            let voided: Option<i64> = row.get(4)?;
            let selections_json: String = row.get(5)?;
            Ok((
                Wager {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    placed_at: row.get(2)?,
                    total_amount: row.get(3)?,
                    voided: voided.map(|v| v != 0),
                    selections: Vec::new(),
                },
                selections_json,
            ))
        })?;

        let mut out = Vec::new();
        for r in rows {
            let (mut wager, selections_json) = r.context("read wager row")?;
            wager.selections = match serde_json::from_str::<Vec<WagerSelection>>(&selections_json) {
                Ok(s) => s,
                Err(e) => {
                    warn!(wager = %wager.id, error = %e, "bad selections payload, treating as empty");
                    Vec::new()
                }
            };
            out.push(wager);
        }
        Ok(out)
    }

    // ===== Payments / collections =====

    pub async fn insert_payment(
        &self,
        id: &str,
        agent_id: &str,
        date: NaiveDate,
        amount: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO payments (id, agent_id, date, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, agent_id, date.to_string(), amount],
        )
        .context("insert payment")?;
        Ok(())
    }

    pub async fn insert_collection(
        &self,
        id: &str,
        agent_id: &str,
        date: NaiveDate,
        amount: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO collections (id, agent_id, date, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, agent_id, date.to_string(), amount],
        )
        .context("insert collection")?;
        Ok(())
    }

    /// Per-agent payment totals for one date, reduced in a single scan.
    pub async fn payments_by_agent(&self, date: NaiveDate) -> Result<HashMap<String, f64>> {
        self.cash_by_agent("payments", date).await
    }

    /// Per-agent collection totals for one date.
    pub async fn collections_by_agent(&self, date: NaiveDate) -> Result<HashMap<String, f64>> {
        self.cash_by_agent("collections", date).await
    }

    async fn cash_by_agent(&self, table: &str, date: NaiveDate) -> Result<HashMap<String, f64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, agent_id, amount FROM {table} WHERE date = ?1"
        ))?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            let id: String = row.get(0)?;
            let agent_id: String = row.get(1)?;
            let amount: String = row.get(2)?;
            Ok((id, agent_id, amount))
        })?;

        let mut out: HashMap<String, f64> = HashMap::new();
        for r in rows {
            let (id, agent_id, amount) = r.context("read cash row")?;
            *out.entry(agent_id).or_insert(0.0) += parse_amount(&amount, table, &id);
        }
        Ok(out)
    }

    /// Total payments recorded for one agent on one date (point read for
    /// event-mode recomputes).
    pub async fn agent_payments_total(&self, agent_id: &str, date: NaiveDate) -> Result<f64> {
        self.agent_cash_total("payments", agent_id, date).await
    }

    pub async fn agent_collections_total(&self, agent_id: &str, date: NaiveDate) -> Result<f64> {
        self.agent_cash_total("collections", agent_id, date).await
    }

    async fn agent_cash_total(
        &self,
        table: &str,
        agent_id: &str,
        date: NaiveDate,
    ) -> Result<f64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, amount FROM {table} WHERE agent_id = ?1 AND date = ?2"
        ))?;
        let rows = stmt.query_map(params![agent_id, date.to_string()], |row| {
            let id: String = row.get(0)?;
            let amount: String = row.get(1)?;
            Ok((id, amount))
        })?;

        let mut total = 0.0;
        for r in rows {
            let (id, amount) = r.context("read cash row")?;
            total += parse_amount(&amount, table, &id);
        }
        Ok(total)
    }

    // ===== Draw results =====

    pub async fn put_draw_results(&self, date: NaiveDate, record: &RawDrawRecord) -> Result<()> {
        let payload = serde_json::to_string(record).context("serialize draw results")?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO draw_results (date, payload_json) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET payload_json = excluded.payload_json",
            params![date.to_string(), payload],
        )
        .context("write draw results")?;
        Ok(())
    }

    /// The raw results container for a date, or None if nothing was
    /// published yet (not an error).
    pub async fn get_draw_results(&self, date: NaiveDate) -> Result<Option<RawDrawRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached("SELECT payload_json FROM draw_results WHERE date = ?1")?;
        let payload: Option<String> = stmt
            .query_row(params![date.to_string()], |row| row.get(0))
            .optional()
            .context("read draw results")?;

        match payload {
            Some(json) => {
                let record =
                    serde_json::from_str(&json).context("deserialize draw results payload")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    // ===== Daily summaries =====

    /// Field-merge upsert keyed by (agent, date). Safe to apply repeatedly;
    /// overlapping batch and event-mode writes converge on last-write-wins.
    pub async fn upsert_summary(&self, summary: &DailySummary) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO daily_summaries
             (agent_id, date, prior_balance, wagered, commission, prizes,
              day_movement, new_balance, payments, collections, module, position, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(agent_id, date) DO UPDATE SET
                prior_balance = excluded.prior_balance,
                wagered = excluded.wagered,
                commission = excluded.commission,
                prizes = excluded.prizes,
                day_movement = excluded.day_movement,
                new_balance = excluded.new_balance,
                payments = excluded.payments,
                collections = excluded.collections,
                module = excluded.module,
                position = excluded.position,
                updated_at = excluded.updated_at",
            params![
                &summary.agent_id,
                summary.date.to_string(),
                summary.prior_balance,
                summary.wagered,
                summary.commission,
                summary.prizes,
                summary.day_movement,
                summary.new_balance,
                summary.payments,
                summary.collections,
                summary.module,
                summary.position,
                summary.updated_at,
            ],
        )
        .context("upsert daily summary")?;
        Ok(())
    }

    pub async fn get_summary(
        &self,
        agent_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT agent_id, prior_balance, wagered, commission, prizes,
                    day_movement, new_balance, payments, collections, module, position, updated_at
             FROM daily_summaries WHERE agent_id = ?1 AND date = ?2",
        )?;
        stmt.query_row(params![agent_id, date.to_string()], |row| {
            Ok(DailySummary {
                agent_id: row.get(0)?,
                date,
                prior_balance: row.get(1)?,
                wagered: row.get(2)?,
                commission: row.get(3)?,
                prizes: row.get(4)?,
                day_movement: row.get(5)?,
                new_balance: row.get(6)?,
                payments: row.get(7)?,
                collections: row.get(8)?,
                module: row.get(9)?,
                position: row.get(10)?,
                updated_at: row.get(11)?,
            })
        })
        .optional()
        .context("read daily summary")
    }

    /// All summaries for a date in display order (module, then position).
    pub async fn summaries_for_date(&self, date: NaiveDate) -> Result<Vec<DailySummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT agent_id, prior_balance, wagered, commission, prizes,
                    day_movement, new_balance, payments, collections, module, position, updated_at
             FROM daily_summaries WHERE date = ?1
             ORDER BY module ASC, position ASC",
        )?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            Ok(DailySummary {
                agent_id: row.get(0)?,
                date,
                prior_balance: row.get(1)?,
                wagered: row.get(2)?,
                commission: row.get(3)?,
                prizes: row.get(4)?,
                day_movement: row.get(5)?,
                new_balance: row.get(6)?,
                payments: row.get(7)?,
                collections: row.get(8)?,
                module: row.get(9)?,
                position: row.get(10)?,
                updated_at: row.get(11)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r.context("read daily summary row")?);
        }
        Ok(out)
    }

    /// Closing balances for every agent on `date`, in one bulk read.
    /// Agents with no summary that day are simply absent (balance 0).
    pub async fn closing_balances(&self, date: NaiveDate) -> Result<HashMap<String, f64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT agent_id, new_balance FROM daily_summaries WHERE date = ?1",
        )?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            let agent_id: String = row.get(0)?;
            let balance: f64 = row.get(1)?;
            Ok((agent_id, balance))
        })?;

        let mut out = HashMap::new();
        for r in rows {
            let (agent_id, balance) = r.context("read closing balance row")?;
            out.insert(agent_id, balance);
        }
        Ok(out)
    }

    /// Closing balance for one agent on `date`, 0.0 if no summary exists.
    pub async fn closing_balance(&self, agent_id: &str, date: NaiveDate) -> Result<f64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT new_balance FROM daily_summaries WHERE agent_id = ?1 AND date = ?2",
        )?;
        let balance: Option<f64> = stmt
            .query_row(params![agent_id, date.to_string()], |row| row.get(0))
            .optional()
            .context("read closing balance")?;
        Ok(balance.unwrap_or(0.0))
    }
}

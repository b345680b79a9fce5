//! Core data types shared across the settlement engine.
//!
//! Agents, wagers, draw results, cash movements and the persisted
//! per-agent-per-day settlement record. Everything here is plain data;
//! the pipeline logic lives under `settlement/`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// A sales agent (pasador). Created by back-office administration;
/// read-only to the settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Commission retained by the agent, as a percentage of gross wagered
    /// (e.g. 10.0 means 10%). Agent-level configuration the engine only reads.
    pub commission_pct: f64,
    /// Numbered module the agent belongs to.
    pub module: u32,
    /// Position within the module.
    pub position: u32,
}

impl Agent {
    /// Display code shown on settlement sheets, e.g. "72-0014".
    pub fn display_code(&self) -> String {
        format!("{}-{:04}", self.module, self.position)
    }
}

/// One numeric pick inside a wager: which lottery/time-slot it targets,
/// the chosen numbers and the stake allocated to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerSelection {
    pub lottery: String,
    pub slot: String,
    pub numbers: Vec<String>,
    pub stake: f64,
}

/// A single ticket. Immutable once recorded; the engine never mutates
/// wagers, only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: String,
    pub agent_id: String,
    /// Placement timestamp, `%Y-%m-%dT%H:%M:%S` local time.
    pub placed_at: String,
    pub total_amount: f64,
    /// Missing flag means not voided.
    pub voided: Option<bool>,
    pub selections: Vec<WagerSelection>,
}

impl Wager {
    pub fn is_voided(&self) -> bool {
        self.voided.unwrap_or(false)
    }
}

/// Officially published winning numbers for one lottery/time-slot.
/// `numbers[0]` is the first prize position, `numbers[1]` the second, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOutcomeEntry {
    pub lottery: String,
    pub slot: String,
    pub numbers: Vec<String>,
}

/// Raw draw-results record as published by the external results process.
/// One container may carry entries for several dates, keyed by
/// `yyyy-MM-dd` strings; the extractor picks the requested date out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDrawRecord {
    #[serde(flatten)]
    pub days: HashMap<String, Vec<DrawOutcomeEntry>>,
}

/// The engine's sole output entity: one settlement row per (agent, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub agent_id: String,
    pub date: NaiveDate,
    /// Closing balance of the previous day, 0.0 if none persisted.
    pub prior_balance: f64,
    pub wagered: f64,
    pub commission: f64,
    pub prizes: f64,
    /// wagered − commission − prizes.
    pub day_movement: f64,
    /// round2(prior + movement + payments − collections).
    pub new_balance: f64,
    pub payments: f64,
    pub collections: f64,
    /// Denormalized from the agent record for display ordering.
    pub module: u32,
    pub position: u32,
    /// Unix seconds of the last write.
    pub updated_at: i64,
}

/// Runtime configuration, sourced from the environment (.env friendly).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    /// Shared secret required on the manual-trigger endpoint. None disables
    /// the check (local development).
    pub admin_token: Option<String>,
    /// Optional TOML file overriding the built-in prize multipliers.
    pub prize_table_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = env::var("BANCA_DB_PATH").unwrap_or_else(|_| "banca.db".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8090);
        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
        let prize_table_path = env::var("PRIZE_TABLE_PATH").ok().filter(|p| !p.is_empty());

        Self {
            db_path,
            port,
            admin_token,
            prize_table_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_code_pads_position() {
        let agent = Agent {
            id: "a1".into(),
            name: "Juan".into(),
            commission_pct: 10.0,
            module: 72,
            position: 14,
        };
        assert_eq!(agent.display_code(), "72-0014");
    }

    #[test]
    fn missing_voided_flag_means_active() {
        let wager = Wager {
            id: "w1".into(),
            agent_id: "a1".into(),
            placed_at: "2024-05-01T09:30:00".into(),
            total_amount: 50.0,
            voided: None,
            selections: vec![],
        };
        assert!(!wager.is_voided());
    }

    #[test]
    fn raw_draw_record_roundtrips_dates_as_keys() {
        let json = r#"{"2024-05-01":[{"lottery":"nacional","slot":"noche","numbers":["23","45","67"]}]}"#;
        let record: RawDrawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.days["2024-05-01"][0].numbers[0], "23");
    }
}

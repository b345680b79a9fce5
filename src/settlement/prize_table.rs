//! Prize-table lookup injected into the winner matcher.
//!
//! Payout economics are back-office configuration, not engine logic: the
//! matcher only ever asks "a selection staking X hit tier T, what does the
//! house owe". The shipped implementation maps the winning position
//! (1 = first prize) to a stake multiplier, with the usual quiniela
//! defaults, and can be overridden from a TOML file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Tier × stake → amount owed. Implementations must be shareable across the
/// batch orchestrator's concurrent per-agent tasks.
pub trait PrizeTable: Send + Sync {
    fn payout(&self, tier: u8, stake: f64) -> f64;
}

/// Multiplier-per-tier prize table.
#[derive(Debug, Clone)]
pub struct MultiplierTable {
    multipliers: HashMap<u8, f64>,
}

#[derive(Deserialize)]
struct PrizeTableFile {
    /// Tier number (as a TOML key) to stake multiplier, e.g. `"1" = 60.0`.
    tiers: HashMap<String, f64>,
}

impl Default for MultiplierTable {
    fn default() -> Self {
        let mut multipliers = HashMap::new();
        multipliers.insert(1, 60.0);
        multipliers.insert(2, 10.0);
        multipliers.insert(3, 5.0);
        Self { multipliers }
    }
}

impl MultiplierTable {
    pub fn new(multipliers: HashMap<u8, f64>) -> Self {
        Self { multipliers }
    }

    /// Load multipliers from a TOML file:
    ///
    /// ```toml
    /// [tiers]
    /// "1" = 60.0
    /// "2" = 10.0
    /// "3" = 5.0
    /// ```
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read prize table {}", path.display()))?;
        let file: PrizeTableFile = toml::from_str(&raw).context("parse prize table toml")?;

        let mut multipliers = HashMap::new();
        for (tier, multiplier) in file.tiers {
            let tier: u8 = tier
                .parse()
                .with_context(|| format!("prize table tier key '{tier}' is not a number"))?;
            multipliers.insert(tier, multiplier);
        }
        Ok(Self { multipliers })
    }
}

impl PrizeTable for MultiplierTable {
    fn payout(&self, tier: u8, stake: f64) -> f64 {
        stake * self.multipliers.get(&tier).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_pays_first_tier_sixty_to_one() {
        let table = MultiplierTable::default();
        assert_eq!(table.payout(1, 5.0), 300.0);
        assert_eq!(table.payout(2, 5.0), 50.0);
        assert_eq!(table.payout(3, 5.0), 25.0);
    }

    #[test]
    fn unknown_tier_pays_nothing() {
        let table = MultiplierTable::default();
        assert_eq!(table.payout(9, 100.0), 0.0);
    }

    #[test]
    fn toml_override_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prizes.toml");
        std::fs::write(&path, "[tiers]\n\"1\" = 75.0\n\"2\" = 12.0\n").unwrap();

        let table = MultiplierTable::from_toml_file(&path).unwrap();
        assert_eq!(table.payout(1, 2.0), 150.0);
        assert_eq!(table.payout(3, 2.0), 0.0);
    }
}

//! Winner matching and prize totalization.
//!
//! Given one agent's wagers for a day and that day's published outcomes,
//! work out which selections hit which prize tier of which draw, and what
//! the resulting prize liability is. Pure functions shared by the batch
//! orchestrator and the event-mode recalculator, so both paths cannot drift.

use std::collections::HashMap;

use crate::models::{DrawOutcomeEntry, Wager};
use crate::settlement::prize_table::PrizeTable;

/// One matched hit: a selection's number equalled a draw's winning number
/// at some prize position.
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeHit {
    pub wager_id: String,
    pub number: String,
    /// Winning position that matched, 1-based (1 = first prize).
    pub tier: u8,
    /// Amount owed for this hit, from the injected prize table.
    pub amount: f64,
}

/// Hits grouped by draw (lottery + time-slot), then by prize tier.
pub type WinningsByDraw = HashMap<String, HashMap<u8, Vec<PrizeHit>>>;

fn draw_key(lottery: &str, slot: &str) -> String {
    format!("{lottery}@{slot}")
}

/// Voided wagers never reach matching or totals; a missing flag means the
/// wager stands.
pub fn active_wagers(wagers: &[Wager]) -> Vec<&Wager> {
    wagers.iter().filter(|w| !w.is_voided()).collect()
}

/// Gross amount staked across the given (already filtered) wagers.
pub fn gross_wagered(wagers: &[&Wager]) -> f64 {
    wagers.iter().map(|w| w.total_amount).sum()
}

/// Match every selection of every wager against every published outcome for
/// its lottery and time-slot. Each (selection number, winning position)
/// equality is recorded as an independent hit; one wager can hit several
/// tiers and several draws on the same day.
///
/// No outcomes published ⇒ empty map, regardless of wager volume.
pub fn match_winners(
    wagers: &[&Wager],
    outcomes: &[DrawOutcomeEntry],
    prize_table: &dyn PrizeTable,
) -> WinningsByDraw {
    let mut winnings: WinningsByDraw = HashMap::new();
    if outcomes.is_empty() {
        return winnings;
    }

    for wager in wagers {
        for selection in &wager.selections {
            for outcome in outcomes
                .iter()
                .filter(|o| o.lottery == selection.lottery && o.slot == selection.slot)
            {
                for (position, winning_number) in outcome.numbers.iter().enumerate() {
                    let tier = (position + 1) as u8;
                    for number in &selection.numbers {
                        if number == winning_number {
                            let amount = prize_table.payout(tier, selection.stake);
                            winnings
                                .entry(draw_key(&outcome.lottery, &outcome.slot))
                                .or_default()
                                .entry(tier)
                                .or_default()
                                .push(PrizeHit {
                                    wager_id: wager.id.clone(),
                                    number: number.clone(),
                                    tier,
                                    amount,
                                });
                        }
                    }
                }
            }
        }
    }

    winnings
}

/// Unconditional sum of every hit across every draw and tier. No rounding
/// here; the balance calculator rounds once at the end.
pub fn total_prizes(winnings: &WinningsByDraw) -> f64 {
    winnings
        .values()
        .flat_map(|tiers| tiers.values())
        .flat_map(|hits| hits.iter())
        .map(|hit| hit.amount)
        .sum()
}

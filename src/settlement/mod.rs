//! Daily Settlement Aggregation Engine.
//!
//! For each agent and calendar day: how much was wagered, what commission
//! and prize money is owed, how much cash changed hands, and the running
//! balance carried forward. Two entry points share one pure core:
//!
//! - `orchestrator::run_batch` settles a whole date for every agent
//!   (nightly cron or the manual trigger endpoint);
//! - `recalc::Recalculator` re-settles the affected agent(s) whenever a
//!   single upstream record changes.
//!
//! Both converge on the same persisted record per (agent, date), so they
//! are interchangeable and safe to run concurrently.

pub mod balance;
pub mod draws;
pub mod matcher;
pub mod orchestrator;
pub mod prize_table;
pub mod recalc;

pub use balance::{round2, settle, BalanceInput, BalanceResult};
pub use draws::extract_outcomes;
pub use matcher::{active_wagers, gross_wagered, match_winners, total_prizes, PrizeHit};
pub use orchestrator::{compute_summary, run_batch, AgentFailure, BatchReport};
pub use prize_table::{MultiplierTable, PrizeTable};
pub use recalc::{spawn_recalculator, ChangeEvent, RecalcOutcome, Recalculator};

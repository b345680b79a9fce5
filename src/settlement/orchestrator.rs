//! Batch settlement of one calendar date across the whole agent roster.
//!
//! Read phase first: draw outcomes, roster, prior-day balances and the
//! day's cash movements are loaded in bulk so every agent settles against
//! one consistent snapshot. Per-agent wager fetch, compute and persist then
//! run with bounded concurrency; one agent failing is logged and reported,
//! never fatal to the rest of the batch.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{Agent, DailySummary, DrawOutcomeEntry, Wager};
use crate::settlement::balance::{settle, BalanceInput};
use crate::settlement::draws::extract_outcomes;
use crate::settlement::matcher::{active_wagers, gross_wagered, match_winners, total_prizes};
use crate::settlement::prize_table::PrizeTable;
use crate::store::SettlementDb;

/// Upper bound on in-flight per-agent pipelines. Agents' wager streams are
/// independent, so ordering between them does not matter.
const MAX_CONCURRENT_AGENTS: usize = 16;

/// One agent the batch could not settle; the caller owns retry policy.
#[derive(Debug, Clone, Serialize)]
pub struct AgentFailure {
    pub agent_id: String,
    pub error: String,
}

/// Outcome of a batch run: everything that settled (in display order) plus
/// everything that did not. The batch itself "completing" is independent of
/// individual agents failing.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub date: NaiveDate,
    pub settled: Vec<DailySummary>,
    pub failures: Vec<AgentFailure>,
}

/// Build one agent's settlement record from already-gathered inputs.
/// Pure apart from the write timestamp; shared verbatim by the batch and
/// event-mode paths.
pub fn compute_summary(
    agent: &Agent,
    date: NaiveDate,
    wagers: &[Wager],
    outcomes: &[DrawOutcomeEntry],
    prize_table: &dyn PrizeTable,
    prior_balance: f64,
    payments: f64,
    collections: f64,
) -> DailySummary {
    let active = active_wagers(wagers);
    let wagered = gross_wagered(&active);
    let commission = wagered * agent.commission_pct / 100.0;
    let winnings = match_winners(&active, outcomes, prize_table);
    let prizes = total_prizes(&winnings);

    let balance = settle(&BalanceInput {
        prior_balance,
        wagered,
        commission,
        prizes,
        payments,
        collections,
    });

    DailySummary {
        agent_id: agent.id.clone(),
        date,
        prior_balance: balance.prior_balance,
        wagered,
        commission,
        prizes,
        day_movement: balance.day_movement,
        new_balance: balance.new_balance,
        payments,
        collections,
        module: agent.module,
        position: agent.position,
        updated_at: Utc::now().timestamp(),
    }
}

/// Fetch one agent's wagers, settle them, and persist the summary.
pub(crate) async fn settle_agent(
    db: &SettlementDb,
    prize_table: &dyn PrizeTable,
    agent: &Agent,
    date: NaiveDate,
    outcomes: &[DrawOutcomeEntry],
    prior_balance: f64,
    payments: f64,
    collections: f64,
) -> Result<DailySummary> {
    let wagers = db
        .wagers_for_day(&agent.id, date)
        .await
        .with_context(|| format!("load wagers for agent {}", agent.id))?;

    let summary = compute_summary(
        agent,
        date,
        &wagers,
        outcomes,
        prize_table,
        prior_balance,
        payments,
        collections,
    );

    db.upsert_summary(&summary)
        .await
        .with_context(|| format!("persist summary for agent {}", agent.id))?;

    debug!(
        agent = %agent.display_code(),
        wagered = summary.wagered,
        prizes = summary.prizes,
        new_balance = summary.new_balance,
        "agent settled"
    );
    Ok(summary)
}

/// Produce a DailySummary for every agent for `date`.
///
/// Read-phase failures (outcomes, roster, balances, cash) abort the whole
/// invocation; per-agent failures are collected into the report instead.
pub async fn run_batch(
    db: &SettlementDb,
    prize_table: &dyn PrizeTable,
    date: NaiveDate,
) -> Result<BatchReport> {
    let prior_date = date
        .pred_opt()
        .context("settlement date has no previous day")?;

    // Read phase: one consistent snapshot for the whole roster.
    let raw_results = db
        .get_draw_results(date)
        .await
        .context("load draw results")?;
    let outcomes = raw_results
        .map(|raw| extract_outcomes(date, &raw))
        .unwrap_or_default();
    if outcomes.is_empty() {
        info!(%date, "no draw outcomes published yet, settling with zero prizes");
    }

    let agents = db.list_agents().await.context("load agent roster")?;
    let prior_balances = db
        .closing_balances(prior_date)
        .await
        .context("load prior-day balances")?;
    let payments = db
        .payments_by_agent(date)
        .await
        .context("load payments")?;
    let collections = db
        .collections_by_agent(date)
        .await
        .context("load collections")?;

    info!(%date, agents = agents.len(), outcomes = outcomes.len(), "starting batch settlement");

    // Per-agent phase: independent pipelines, bounded fan-out.
    let outcomes_ref = &outcomes;
    let results: Vec<(Agent, Result<DailySummary>)> = stream::iter(agents)
        .map(|agent| {
            let prior_balance = prior_balances.get(&agent.id).copied().unwrap_or(0.0);
            let paid = payments.get(&agent.id).copied().unwrap_or(0.0);
            let collected = collections.get(&agent.id).copied().unwrap_or(0.0);
            async move {
                let result = settle_agent(
                    db,
                    prize_table,
                    &agent,
                    date,
                    outcomes_ref,
                    prior_balance,
                    paid,
                    collected,
                )
                .await;
                (agent, result)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_AGENTS)
        .collect()
        .await;

    let mut settled = Vec::new();
    let mut failures = Vec::new();
    for (agent, result) in results {
        match result {
            Ok(summary) => settled.push(summary),
            Err(e) => {
                warn!(agent = %agent.id, error = %format!("{e:#}"), "agent settlement failed, skipping");
                failures.push(AgentFailure {
                    agent_id: agent.id,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    // Completion order is arbitrary; settlement sheets go out by module/position.
    settled.sort_by_key(|s| (s.module, s.position));

    info!(
        %date,
        settled = settled.len(),
        failed = failures.len(),
        "batch settlement finished"
    );

    Ok(BatchReport {
        date,
        settled,
        failures,
    })
}

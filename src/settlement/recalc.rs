//! Event-driven incremental recalculation.
//!
//! Upstream writers (wager capture, cashier desk, results publisher) emit a
//! change notification after each durable write; this module consumes those
//! and keeps the affected DailySummaries fresh without rescanning the
//! roster. Delivery is at-least-once, so every recompute ends in the same
//! idempotent field-merge upsert the batch path uses — replays and races
//! simply converge.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::DailySummary;
use crate::settlement::draws::extract_outcomes;
use crate::settlement::orchestrator::{self, compute_summary, BatchReport};
use crate::settlement::prize_table::PrizeTable;
use crate::store::SettlementDb;

/// A single upstream data change. Carries just enough identity to scope the
/// recompute: one (agent, date) pair, or one date for draw results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    WagerWritten { agent_id: String, date: NaiveDate },
    PaymentWritten { agent_id: String, date: NaiveDate },
    CollectionWritten { agent_id: String, date: NaiveDate },
    DrawResultWritten { date: NaiveDate },
}

impl ChangeEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            ChangeEvent::WagerWritten { date, .. }
            | ChangeEvent::PaymentWritten { date, .. }
            | ChangeEvent::CollectionWritten { date, .. }
            | ChangeEvent::DrawResultWritten { date } => *date,
        }
    }
}

/// What one event ended up touching.
#[derive(Debug)]
pub enum RecalcOutcome {
    /// A single (agent, date) summary was recomputed.
    Agent(Box<DailySummary>),
    /// A draw-result change fanned out to the whole roster for the date.
    FanOut(BatchReport),
}

#[derive(Clone)]
pub struct Recalculator {
    db: SettlementDb,
    prize_table: Arc<dyn PrizeTable>,
}

impl Recalculator {
    pub fn new(db: SettlementDb, prize_table: Arc<dyn PrizeTable>) -> Self {
        Self { db, prize_table }
    }

    /// Apply one upstream change. Wager/payment/collection writes touch
    /// exactly the one affected agent; a draw-result write recomputes every
    /// agent for the date, because all prize liabilities depend on the same
    /// outcome set.
    pub async fn apply(&self, event: ChangeEvent) -> Result<RecalcOutcome> {
        match event {
            ChangeEvent::WagerWritten { agent_id, date }
            | ChangeEvent::PaymentWritten { agent_id, date }
            | ChangeEvent::CollectionWritten { agent_id, date } => {
                let summary = self.recalc_agent(&agent_id, date).await?;
                Ok(RecalcOutcome::Agent(Box::new(summary)))
            }
            ChangeEvent::DrawResultWritten { date } => {
                info!(%date, "draw results changed, recomputing full roster");
                let report =
                    orchestrator::run_batch(&self.db, self.prize_table.as_ref(), date).await?;
                Ok(RecalcOutcome::FanOut(report))
            }
        }
    }

    /// Recompute one (agent, date) settlement from targeted point reads,
    /// through the same pure core the batch orchestrator uses.
    pub async fn recalc_agent(&self, agent_id: &str, date: NaiveDate) -> Result<DailySummary> {
        let prior_date = date
            .pred_opt()
            .context("settlement date has no previous day")?;

        let agent = self
            .db
            .get_agent(agent_id)
            .await?
            .with_context(|| format!("unknown agent {agent_id}"))?;

        let outcomes = self
            .db
            .get_draw_results(date)
            .await
            .context("load draw results")?
            .map(|raw| extract_outcomes(date, &raw))
            .unwrap_or_default();

        let prior_balance = self.db.closing_balance(agent_id, prior_date).await?;
        let payments = self.db.agent_payments_total(agent_id, date).await?;
        let collections = self.db.agent_collections_total(agent_id, date).await?;
        let wagers = self.db.wagers_for_day(agent_id, date).await?;

        let summary = compute_summary(
            &agent,
            date,
            &wagers,
            &outcomes,
            self.prize_table.as_ref(),
            prior_balance,
            payments,
            collections,
        );

        self.db
            .upsert_summary(&summary)
            .await
            .with_context(|| format!("persist summary for agent {agent_id}"))?;

        info!(
            agent = %agent.display_code(),
            %date,
            new_balance = summary.new_balance,
            "incremental settlement applied"
        );
        Ok(summary)
    }
}

/// Spawn the background consumer and hand back the sender upstream writers
/// (or the HTTP event intake) push into. Fire-and-forget relative to the
/// triggering write: a failed recompute is logged and dropped, the caller
/// owns retries.
pub fn spawn_recalculator(recalc: Recalculator) -> mpsc::Sender<ChangeEvent> {
    let (tx, mut rx) = mpsc::channel::<ChangeEvent>(256);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let date = event.date();
            if let Err(e) = recalc.apply(event).await {
                warn!(%date, error = %format!("{e:#}"), "incremental recompute failed");
            }
        }
        info!("change-event channel closed, recalculator stopping");
    });

    tx
}

//! End-to-end settlement tests against a throwaway SQLite database.
//!
//! Covers the batch orchestrator, the event-mode recalculator, and the
//! properties the two must share: idempotence, convergence, and day-to-day
//! balance chaining.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use banca_backend::models::{Agent, DailySummary, DrawOutcomeEntry, RawDrawRecord, Wager, WagerSelection};
use banca_backend::settlement::{
    run_batch, ChangeEvent, MultiplierTable, PrizeTable, RecalcOutcome, Recalculator,
};
use banca_backend::store::SettlementDb;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn open_db(dir: &TempDir) -> SettlementDb {
    let path = dir.path().join("settlement.db");
    SettlementDb::open(path.to_str().unwrap()).unwrap()
}

fn prize_table() -> Arc<dyn PrizeTable> {
    Arc::new(MultiplierTable::default())
}

fn agent(id: &str, module: u32, position: u32, commission_pct: f64) -> Agent {
    Agent {
        id: id.to_string(),
        name: format!("agent {id}"),
        commission_pct,
        module,
        position,
    }
}

fn wager(id: &str, agent_id: &str, day: &str, selections: Vec<WagerSelection>) -> Wager {
    let total_amount = selections.iter().map(|s| s.stake).sum();
    Wager {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        placed_at: format!("{day}T10:30:00"),
        total_amount,
        voided: None,
        selections,
    }
}

fn pick(lottery: &str, slot: &str, numbers: &[&str], stake: f64) -> WagerSelection {
    WagerSelection {
        lottery: lottery.to_string(),
        slot: slot.to_string(),
        numbers: numbers.iter().map(|n| n.to_string()).collect(),
        stake,
    }
}

fn draw_record(day: &str, entries: Vec<DrawOutcomeEntry>) -> RawDrawRecord {
    let mut days = HashMap::new();
    days.insert(day.to_string(), entries);
    RawDrawRecord { days }
}

fn outcome(lottery: &str, slot: &str, numbers: &[&str]) -> DrawOutcomeEntry {
    DrawOutcomeEntry {
        lottery: lottery.to_string(),
        slot: slot.to_string(),
        numbers: numbers.iter().map(|n| n.to_string()).collect(),
    }
}

/// Zero the write timestamp so records from different runs compare equal.
fn scrub(mut summary: DailySummary) -> DailySummary {
    summary.updated_at = 0;
    summary
}

/// Seed the worked example: prior balance 1000, wagered 5000, 10%
/// commission, 200 in prizes, 300 paid, 150 collected.
async fn seed_worked_example(db: &SettlementDb) {
    let day = "2024-05-02";
    db.upsert_agent(&agent("a1", 72, 14, 10.0)).await.unwrap();

    // Prior day's persisted closing balance.
    let prior = DailySummary {
        agent_id: "a1".to_string(),
        date: date("2024-05-01"),
        prior_balance: 0.0,
        wagered: 0.0,
        commission: 0.0,
        prizes: 0.0,
        day_movement: 0.0,
        new_balance: 1000.0,
        payments: 0.0,
        collections: 0.0,
        module: 72,
        position: 14,
        updated_at: 1,
    };
    db.upsert_summary(&prior).await.unwrap();

    // 4980 staked on a number that will not draw, 20 on one that hits the
    // second tier (x10 = 200 in prizes). Gross wagered 5000.
    db.insert_wager(&wager(
        "w1",
        "a1",
        day,
        vec![pick("nacional", "noche", &["99"], 4980.0)],
    ))
    .await
    .unwrap();
    db.insert_wager(&wager(
        "w2",
        "a1",
        day,
        vec![pick("nacional", "noche", &["45"], 20.0)],
    ))
    .await
    .unwrap();

    db.put_draw_results(
        date(day),
        &draw_record(day, vec![outcome("nacional", "noche", &["23", "45", "67"])]),
    )
    .await
    .unwrap();

    db.insert_payment("p1", "a1", date(day), "300").await.unwrap();
    db.insert_collection("c1", "a1", date(day), "150").await.unwrap();
}

#[tokio::test]
async fn batch_settles_the_worked_example() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    seed_worked_example(&db).await;

    let table = prize_table();
    let report = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.settled.len(), 1);

    let summary = &report.settled[0];
    assert_eq!(summary.prior_balance, 1000.0);
    assert_eq!(summary.wagered, 5000.0);
    assert_eq!(summary.commission, 500.0);
    assert_eq!(summary.prizes, 200.0);
    assert_eq!(summary.day_movement, 4300.0);
    assert_eq!(summary.payments, 300.0);
    assert_eq!(summary.collections, 150.0);
    assert_eq!(summary.new_balance, 5450.0);

    // The report reflects what was persisted.
    let stored = db.get_summary("a1", date("2024-05-02")).await.unwrap().unwrap();
    assert_eq!(scrub(stored), scrub(summary.clone()));
}

#[tokio::test]
async fn rerunning_the_batch_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    seed_worked_example(&db).await;

    let table = prize_table();
    let first = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();
    let second = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();

    let first: Vec<_> = first.settled.into_iter().map(scrub).collect();
    let second: Vec<_> = second.settled.into_iter().map(scrub).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn incremental_recompute_converges_with_the_batch() {
    // Same upstream data in two separate databases; one settled by the
    // batch orchestrator, one by a targeted event recompute.
    let batch_dir = TempDir::new().unwrap();
    let batch_db = open_db(&batch_dir);
    seed_worked_example(&batch_db).await;

    let event_dir = TempDir::new().unwrap();
    let event_db = open_db(&event_dir);
    seed_worked_example(&event_db).await;

    let table = prize_table();
    let report = run_batch(&batch_db, table.as_ref(), date("2024-05-02")).await.unwrap();
    let from_batch = scrub(report.settled[0].clone());

    let recalc = Recalculator::new(event_db.clone(), prize_table());
    let outcome = recalc
        .apply(ChangeEvent::WagerWritten {
            agent_id: "a1".to_string(),
            date: date("2024-05-02"),
        })
        .await
        .unwrap();

    let from_event = match outcome {
        RecalcOutcome::Agent(summary) => scrub(*summary),
        other => panic!("expected single-agent recompute, got {other:?}"),
    };
    assert_eq!(from_batch, from_event);
}

#[tokio::test]
async fn no_draw_results_means_zero_prizes_for_everyone() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    db.upsert_agent(&agent("a2", 1, 2, 12.0)).await.unwrap();
    db.insert_wager(&wager(
        "w1",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["23"], 1000.0)],
    ))
    .await
    .unwrap();
    db.insert_wager(&wager(
        "w2",
        "a2",
        "2024-05-02",
        vec![pick("leidsa", "tarde", &["45"], 800.0)],
    ))
    .await
    .unwrap();
    // No draw results published for the date.

    let table = prize_table();
    let report = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();

    assert_eq!(report.settled.len(), 2);
    for summary in &report.settled {
        assert_eq!(summary.prizes, 0.0, "agent {}", summary.agent_id);
    }
    assert!(report.settled[0].wagered > 0.0);
}

#[tokio::test]
async fn payment_event_touches_exactly_one_agent() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let day = date("2024-05-02");

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    db.upsert_agent(&agent("a2", 1, 2, 10.0)).await.unwrap();
    db.insert_wager(&wager(
        "w1",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["23"], 100.0)],
    ))
    .await
    .unwrap();
    db.insert_wager(&wager(
        "w2",
        "a2",
        "2024-05-02",
        vec![pick("nacional", "noche", &["45"], 100.0)],
    ))
    .await
    .unwrap();

    let table = prize_table();
    run_batch(&db, table.as_ref(), day).await.unwrap();

    let other_before = db.get_summary("a2", day).await.unwrap().unwrap();

    // A new payment lands for a1 only.
    db.insert_payment("p9", "a1", day, "250").await.unwrap();
    let recalc = Recalculator::new(db.clone(), prize_table());
    recalc
        .apply(ChangeEvent::PaymentWritten {
            agent_id: "a1".to_string(),
            date: day,
        })
        .await
        .unwrap();

    let touched = db.get_summary("a1", day).await.unwrap().unwrap();
    assert_eq!(touched.payments, 250.0);

    // a2's row was not rewritten at all, timestamp included.
    let other_after = db.get_summary("a2", day).await.unwrap().unwrap();
    assert_eq!(other_before, other_after);
}

#[tokio::test]
async fn draw_result_event_fans_out_to_the_whole_roster() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let day = date("2024-05-02");

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    db.upsert_agent(&agent("a2", 1, 2, 10.0)).await.unwrap();
    db.insert_wager(&wager(
        "w1",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["23"], 10.0)],
    ))
    .await
    .unwrap();
    db.insert_wager(&wager(
        "w2",
        "a2",
        "2024-05-02",
        vec![pick("nacional", "noche", &["99"], 10.0)],
    ))
    .await
    .unwrap();
    db.put_draw_results(
        day,
        &draw_record("2024-05-02", vec![outcome("nacional", "noche", &["23", "45", "67"])]),
    )
    .await
    .unwrap();

    let recalc = Recalculator::new(db.clone(), prize_table());
    let outcome = recalc
        .apply(ChangeEvent::DrawResultWritten { date: day })
        .await
        .unwrap();

    let report = match outcome {
        RecalcOutcome::FanOut(report) => report,
        other => panic!("expected roster fan-out, got {other:?}"),
    };
    assert_eq!(report.settled.len(), 2);

    // a1's pick of 23 hit first prize at x60.
    let hit = db.get_summary("a1", day).await.unwrap().unwrap();
    assert_eq!(hit.prizes, 600.0);
    let miss = db.get_summary("a2", day).await.unwrap().unwrap();
    assert_eq!(miss.prizes, 0.0);
}

#[tokio::test]
async fn balances_chain_across_consecutive_days() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    db.insert_wager(&wager(
        "w1",
        "a1",
        "2024-05-01",
        vec![pick("nacional", "noche", &["99"], 1000.0)],
    ))
    .await
    .unwrap();
    db.insert_wager(&wager(
        "w2",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["99"], 400.0)],
    ))
    .await
    .unwrap();

    let table = prize_table();
    let day1 = run_batch(&db, table.as_ref(), date("2024-05-01")).await.unwrap();
    let day2 = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();

    // Day 1: 1000 − 100 commission = 900 from a zero start.
    assert_eq!(day1.settled[0].new_balance, 900.0);
    // Day 2 starts from day 1's persisted close.
    assert_eq!(day2.settled[0].prior_balance, 900.0);
    assert_eq!(day2.settled[0].new_balance, 900.0 + 400.0 - 40.0);

    // Recomputing day 2 after the fact still reads the same prior close.
    let again = run_batch(&db, table.as_ref(), date("2024-05-02")).await.unwrap();
    assert_eq!(
        scrub(again.settled[0].clone()),
        scrub(day2.settled[0].clone())
    );
}

#[tokio::test]
async fn unparseable_cash_amounts_settle_as_zero() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let day = date("2024-05-02");

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    db.insert_payment("p1", "a1", day, "not-a-number").await.unwrap();
    db.insert_payment("p2", "a1", day, "120.50").await.unwrap();
    db.insert_collection("c1", "a1", day, "").await.unwrap();

    let table = prize_table();
    let report = run_batch(&db, table.as_ref(), day).await.unwrap();

    let summary = &report.settled[0];
    assert_eq!(summary.payments, 120.50);
    assert_eq!(summary.collections, 0.0);
    assert_eq!(summary.new_balance, 120.50);
}

#[tokio::test]
async fn voided_wagers_stay_out_of_the_settlement() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let day = date("2024-05-02");

    db.upsert_agent(&agent("a1", 1, 1, 10.0)).await.unwrap();
    let mut voided = wager(
        "w1",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["23"], 500.0)],
    );
    voided.voided = Some(true);
    db.insert_wager(&voided).await.unwrap();
    db.insert_wager(&wager(
        "w2",
        "a1",
        "2024-05-02",
        vec![pick("nacional", "noche", &["99"], 50.0)],
    ))
    .await
    .unwrap();
    db.put_draw_results(
        day,
        &draw_record("2024-05-02", vec![outcome("nacional", "noche", &["23", "45", "67"])]),
    )
    .await
    .unwrap();

    let table = prize_table();
    let report = run_batch(&db, table.as_ref(), day).await.unwrap();

    let summary = &report.settled[0];
    // The voided wager would have hit first prize; it contributes nothing.
    assert_eq!(summary.wagered, 50.0);
    assert_eq!(summary.prizes, 0.0);
    assert_eq!(summary.commission, 5.0);
}

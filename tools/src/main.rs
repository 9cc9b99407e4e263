//! sweep-runner: headless entry point for the fraud-case enrichment engine.
//!
//! Meant to be invoked on a schedule (cron or an external orchestrator).
//! One invocation = one full pipeline run. Prints the run report as JSON
//! and exits non-zero when the run failed or any case did.
//!
//! Usage:
//!   sweep-runner --db cases.db
//!   sweep-runner --db cases.db --dry-run
//!   sweep-runner --db cases.db --config sweep.json
//!   sweep-runner --db :memory: --seed-demo

use anyhow::Result;
use chrono::Utc;
use simfraud_core::{
    case::{CaseStatus, FraudCase},
    clock::SystemClock,
    config::EngineConfig,
    engine::EnrichEngine,
    store::{CaseStore, SqliteCaseStore},
    types::SimNumber,
};
use std::env;
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].clone())
        .or_else(|| env::var("SWEEP_DB").ok())
        .unwrap_or_else(|| ":memory:".to_string());
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone());
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let seed_demo = args.iter().any(|a| a == "--seed-demo");

    let mut cfg = match config_path {
        Some(path) => EngineConfig::load(Path::new(&path))?,
        None => EngineConfig::default(),
    };
    cfg.dry_run = cfg.dry_run || dry_run;

    log::info!("sweep-runner: db={db} dry_run={}", cfg.dry_run);

    let store = SqliteCaseStore::open(&db)?;
    store.migrate()?;
    if seed_demo {
        seed_demo_cases(&store)?;
    }

    let engine = EnrichEngine::build(cfg, Arc::new(SystemClock));
    let report = engine.run_once(&store)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

/// A small intake set for local runs: one duplicate-SIM pair, one clean
/// case, one already high-risk case.
fn seed_demo_cases(store: &SqliteCaseStore) -> Result<()> {
    let demo = [
        ("demo-001", Some("0821234567"), None, None),
        ("demo-002", Some("0821234567"), None, None),
        ("demo-003", Some("0827654321"), None, None),
        ("demo-004", Some("0829999999"), Some(60), Some(CaseStatus::UnderReview)),
    ];
    for (id, sim, score, status) in demo {
        store.insert_case(&FraudCase {
            case_id: id.to_string(),
            sim_number: sim.and_then(SimNumber::parse),
            risk_score: score,
            status,
            blocked_until: None,
            ai_comment: None,
            customer_id: format!("cust-{id}"),
            description: "demo: reported SIM takeover".to_string(),
            created_at: Utc::now(),
            version: 0,
        })?;
    }
    log::info!("seeded {} demo cases", demo.len());
    Ok(())
}

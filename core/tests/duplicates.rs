//! Duplicate-SIM detection: grouping, alert payloads, dedup across runs.

use chrono::{DateTime, TimeZone, Utc};
use simfraud_core::{
    case::{CaseStatus, FraudCase},
    clock::ManualClock,
    config::EngineConfig,
    duplicate_detector::DuplicateDetector,
    engine::EnrichEngine,
    normalizer::{Normalizer, DEFAULT_COMMENT},
    store::{CaseStore, SqliteCaseStore},
    types::SimNumber,
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn store() -> SqliteCaseStore {
    let store = SqliteCaseStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn intake(store: &SqliteCaseStore, id: &str, sim: Option<&str>) {
    store
        .insert_case(&FraudCase {
            case_id: id.to_string(),
            sim_number: sim.and_then(SimNumber::parse),
            risk_score: None,
            status: None,
            blocked_until: None,
            ai_comment: None,
            customer_id: format!("cust-{id}"),
            description: "reported SIM takeover".to_string(),
            created_at: t0(),
            version: 0,
        })
        .expect("insert case");
}

fn get(store: &SqliteCaseStore, id: &str) -> FraudCase {
    store
        .get_case(&id.to_string())
        .expect("get case")
        .expect("case exists")
}

fn engine_at(clock: &ManualClock) -> EnrichEngine {
    EnrichEngine::build(EngineConfig::default(), Arc::new(clock.clone()))
}

/// Duplicate symmetry: every member of the group is escalated, and one
/// alert holds the full sorted membership, however intake was ordered.
#[test]
fn group_of_three_gets_one_sorted_alert() {
    let store = store();
    intake(&store, "c-3", Some("0821112222"));
    intake(&store, "c-1", Some("0821112222"));
    intake(&store, "c-2", Some("0821112222"));

    let clock = ManualClock::new(t0());
    engine_at(&clock).run_once(&store).expect("run");

    for id in ["c-1", "c-2", "c-3"] {
        let case = get(&store, id);
        assert!(case.risk_score.expect("score") >= 50, "{id} escalated");
        assert_eq!(case.status, Some(CaseStatus::UnderReview), "{id} status");
    }
    let alerts = store.list_alerts().expect("alerts");
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].case_ids,
        vec!["c-1".to_string(), "c-2".to_string(), "c-3".to_string()]
    );
}

/// Cases without a usable SIM can never be duplicates: no grouping, no
/// alert, and their comment stays the normalizer default.
#[test]
fn blank_sims_are_excluded_from_grouping() {
    let store = store();
    intake(&store, "c-none", None);
    intake(&store, "c-blank", Some("   "));

    let clock = ManualClock::new(t0());
    let report = engine_at(&clock).run_once(&store).expect("run");

    assert_eq!(report.duplicate_groups, 0);
    assert!(store.list_alerts().expect("alerts").is_empty());
    for id in ["c-none", "c-blank"] {
        let case = get(&store, id);
        assert_eq!(case.risk_score, Some(10), "{id} stays low risk");
        assert_eq!(case.ai_comment.as_deref(), Some(DEFAULT_COMMENT), "{id}");
    }
}

/// An unchanged group is not re-alerted; a membership change is.
#[test]
fn alert_is_deduped_until_membership_changes() {
    let store = store();
    intake(&store, "c-1", Some("0821234567"));
    intake(&store, "c-2", Some("0821234567"));

    let clock = ManualClock::new(t0());
    let engine = engine_at(&clock);
    engine.run_once(&store).expect("first run");
    engine.run_once(&store).expect("second run");
    assert_eq!(store.list_alerts().expect("alerts").len(), 1);

    // A third report on the same SIM changes the membership snapshot.
    intake(&store, "c-3", Some("0821234567"));
    engine.run_once(&store).expect("third run");

    let alerts = store.list_alerts().expect("alerts");
    assert_eq!(alerts.len(), 2, "new membership, new alert");
    assert_eq!(alerts[0].case_ids.len(), 2);
    assert_eq!(
        alerts[1].case_ids,
        vec!["c-1".to_string(), "c-2".to_string(), "c-3".to_string()]
    );
}

/// Scores only move up: a member already above the floor keeps its score.
#[test]
fn score_floor_never_lowers_an_existing_score() {
    let store = store();
    intake(&store, "c-low", Some("0821234567"));
    store
        .insert_case(&FraudCase {
            case_id: "c-high".to_string(),
            sim_number: SimNumber::parse("0821234567"),
            risk_score: Some(80),
            status: Some(CaseStatus::UnderReview),
            blocked_until: None,
            ai_comment: Some("escalated earlier".to_string()),
            customer_id: "cust-c-high".to_string(),
            description: "reported SIM takeover".to_string(),
            created_at: t0(),
            version: 0,
        })
        .expect("insert case");

    let clock = ManualClock::new(t0());
    engine_at(&clock).run_once(&store).expect("run");

    assert_eq!(get(&store, "c-low").risk_score, Some(50));
    assert_eq!(get(&store, "c-high").risk_score, Some(80), "monotone");
}

/// A blocked member keeps its status and block notice; only the score
/// floor applies.
#[test]
fn blocked_member_is_not_downgraded() {
    let store = store();
    intake(&store, "c-new", Some("0823334444"));
    store
        .insert_case(&FraudCase {
            case_id: "c-blocked".to_string(),
            sim_number: SimNumber::parse("0823334444"),
            risk_score: Some(30),
            status: Some(CaseStatus::Blocked),
            blocked_until: Some(t0() + chrono::Duration::hours(1)),
            ai_comment: Some("blocked by reviewer".to_string()),
            customer_id: "cust-c-blocked".to_string(),
            description: "reported SIM takeover".to_string(),
            created_at: t0(),
            version: 0,
        })
        .expect("insert case");

    let clock = ManualClock::new(t0());
    engine_at(&clock).run_once(&store).expect("run");

    let blocked = get(&store, "c-blocked");
    assert_eq!(blocked.status, Some(CaseStatus::Blocked));
    assert_eq!(blocked.risk_score, Some(50), "floor still applies");
    assert_eq!(blocked.ai_comment.as_deref(), Some("blocked by reviewer"));
    assert_eq!(
        blocked.blocked_until,
        Some(t0() + chrono::Duration::hours(1)),
        "window untouched"
    );

    let other = get(&store, "c-new");
    assert_eq!(other.status, Some(CaseStatus::UnderReview));
}

/// The grouping barrier spans page boundaries: a pair split across
/// single-row pages is still detected.
#[test]
fn detection_crosses_page_boundaries() {
    let store = store();
    intake(&store, "c-1", Some("0821234567"));
    intake(&store, "c-2", Some("0821234567"));
    intake(&store, "c-3", Some("0827654321"));

    let cfg = EngineConfig {
        page_size: 1,
        ..EngineConfig::default()
    };
    let clock = ManualClock::new(t0());
    let mut engine = EnrichEngine::new(cfg.clone(), Arc::new(clock.clone()));
    engine.register(Box::new(Normalizer::new(cfg.clone())));
    engine.register(Box::new(DuplicateDetector::new(cfg)));

    let report = engine.run_once(&store).expect("run");
    assert_eq!(report.duplicate_groups, 1);
    assert_eq!(store.list_alerts().expect("alerts").len(), 1);
    assert_eq!(get(&store, "c-1").risk_score, Some(50));
    assert_eq!(get(&store, "c-2").risk_score, Some(50));
    assert_eq!(get(&store, "c-3").risk_score, Some(10));
}

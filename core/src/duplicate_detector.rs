//! Duplicate-SIM detector.
//!
//! The only stage with a synchronization barrier: it must see the full
//! snapshot before writing anything. Pass 1 streams every page and
//! accumulates SIM -> case-id groups (ids only, bounded memory); pass 2
//! re-reads each member fresh and writes.
//!
//! Grouping key equality is exact string match on the SIM value — no
//! phone-number format normalization (see SimNumber). Cases without a
//! usable SIM are excluded from grouping at the type level; Resolved
//! cases are closed and do not count toward duplication.

use crate::case::{Alert, CaseStatus, FraudCase};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::stage::{apply_update, EnrichStage};
use crate::store::{CaseStore, CaseUpdate};
use crate::types::{CaseId, SimNumber};
use std::collections::{BTreeMap, BTreeSet};

/// Comment for cases whose SIM appears on no other open case.
pub const LOW_RISK_COMMENT: &str = "No duplicate SIM usage detected; case remains low risk.";

fn duplicate_comment(sim: &SimNumber, group_size: usize) -> String {
    format!("Duplicate SIM usage: {group_size} open cases share SIM {sim}; escalated for review.")
}

pub struct DuplicateDetector {
    cfg: EngineConfig,
    retry: RetryPolicy,
}

impl DuplicateDetector {
    pub fn new(cfg: EngineConfig) -> Self {
        let retry = RetryPolicy::from_config(&cfg);
        Self { cfg, retry }
    }

    /// Pass 1: stream the snapshot into sim -> sorted case-id sets.
    fn collect_groups(
        &self,
        store: &dyn CaseStore,
        report: &mut RunReport,
    ) -> EngineResult<BTreeMap<SimNumber, BTreeSet<CaseId>>> {
        let mut groups: BTreeMap<SimNumber, BTreeSet<CaseId>> = BTreeMap::new();
        let mut cursor = None;
        loop {
            let page = store.list_page(cursor.as_ref(), self.cfg.page_size)?;
            for (case_id, reason) in &page.malformed {
                report.record_failure(self.name(), case_id, reason.clone());
            }
            for case in &page.cases {
                if case.is_resolved() {
                    continue;
                }
                if let Some(sim) = &case.sim_number {
                    groups
                        .entry(sim.clone())
                        .or_default()
                        .insert(case.case_id.clone());
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                return Ok(groups);
            }
        }
    }

    /// Fetch a member fresh for the write pass; the grouping pass only
    /// kept its id, and its version may have moved since.
    fn fetch_member(
        &self,
        store: &dyn CaseStore,
        case_id: &CaseId,
        report: &mut RunReport,
    ) -> Option<FraudCase> {
        match store.get_case(case_id) {
            Ok(Some(case)) => Some(case),
            Ok(None) => {
                report.record_failure(self.name(), case_id, "case disappeared during run");
                None
            }
            Err(err) => {
                report.record_failure(self.name(), case_id, err.to_string());
                None
            }
        }
    }

    fn mark_singleton(&self, store: &dyn CaseStore, case_id: &CaseId, report: &mut RunReport) {
        let Some(case) = self.fetch_member(store, case_id, report) else {
            return;
        };
        // While a case is Blocked its comment belongs to the auto-block
        // engine; touching it here would flip fields between runs.
        if case.is_resolved() || case.status_or_default() == CaseStatus::Blocked {
            return;
        }
        if case.ai_comment.as_deref() == Some(LOW_RISK_COMMENT) {
            return;
        }
        let update = CaseUpdate {
            ai_comment: Some(LOW_RISK_COMMENT.to_string()),
            ..CaseUpdate::default()
        };
        apply_update(
            store,
            &self.retry,
            self.cfg.dry_run,
            self.name(),
            case_id,
            case.version,
            &update,
            report,
        );
    }

    fn escalate_member(
        &self,
        store: &dyn CaseStore,
        sim: &SimNumber,
        group_size: usize,
        case_id: &CaseId,
        report: &mut RunReport,
    ) {
        let Some(case) = self.fetch_member(store, case_id, report) else {
            return;
        };
        if case.is_resolved() {
            return;
        }

        let current_score = case.risk_score.unwrap_or(self.cfg.default_risk_score);
        let floored = current_score.max(self.cfg.duplicate_risk_floor);
        let status = case.status_or_default();

        let mut update = CaseUpdate::default();
        if floored > current_score {
            update.risk_score = Some(floored);
        }
        // Blocked is not downgraded, and its comment stays the block
        // notice until release; only the score floor applies.
        if status != CaseStatus::Blocked {
            if status != CaseStatus::UnderReview {
                update.status = Some(CaseStatus::UnderReview);
            }
            let comment = duplicate_comment(sim, group_size);
            if case.ai_comment.as_deref() != Some(comment.as_str()) {
                update.ai_comment = Some(comment);
            }
        }

        if update.is_empty() {
            return;
        }
        let raised = update.risk_score.is_some();
        if apply_update(
            store,
            &self.retry,
            self.cfg.dry_run,
            self.name(),
            case_id,
            case.version,
            &update,
            report,
        ) && raised
        {
            report.scores_raised += 1;
        }
    }

    fn emit_alert(
        &self,
        store: &dyn CaseStore,
        clock: &dyn Clock,
        sim: &SimNumber,
        case_ids: &[CaseId],
        report: &mut RunReport,
    ) {
        match store.duplicate_alert_exists(sim.as_str(), case_ids) {
            Ok(true) => return, // identical finding already on file
            Ok(false) => {}
            Err(err) => {
                report.record_failure(self.name(), &case_ids[0], err.to_string());
                return;
            }
        }
        if self.cfg.dry_run {
            log::info!(
                "[dry-run] detector would append Duplicate SIM alert for {sim} ({} cases)",
                case_ids.len()
            );
            report.alerts_created += 1;
            return;
        }
        let alert = Alert::duplicate_sim(sim, case_ids.to_vec(), clock.now());
        match store.append_alert(&alert) {
            Ok(id) => {
                log::debug!("duplicate alert {id} appended for SIM {sim}");
                report.alerts_created += 1;
            }
            Err(err) => {
                report.record_failure(
                    self.name(),
                    &case_ids[0],
                    format!("appending duplicate alert for SIM {sim}: {err}"),
                );
            }
        }
    }
}

impl EnrichStage for DuplicateDetector {
    fn name(&self) -> &'static str {
        "duplicate_detector"
    }

    fn run(
        &self,
        store: &dyn CaseStore,
        clock: &dyn Clock,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        let groups = self.collect_groups(store, report)?;

        for (sim, ids) in &groups {
            if ids.len() == 1 {
                let case_id = ids.iter().next().map(String::clone);
                if let Some(case_id) = case_id {
                    self.mark_singleton(store, &case_id, report);
                }
                continue;
            }

            report.duplicate_groups += 1;
            // BTreeSet iteration order is the sorted order the alert
            // payload requires.
            let case_ids: Vec<CaseId> = ids.iter().cloned().collect();
            self.emit_alert(store, clock, sim, &case_ids, report);
            for case_id in &case_ids {
                self.escalate_member(store, sim, case_ids.len(), case_id, report);
            }
        }

        log::info!(
            "duplicate detector: {} groups, {} alerts appended",
            report.duplicate_groups,
            report.alerts_created
        );
        Ok(())
    }
}

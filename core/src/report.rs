//! Run report — the structured summary every invocation produces.
//!
//! The report is the only channel per-case errors travel through: a
//! failed case never aborts its siblings, it becomes a line item here.

use crate::types::{CaseId, RunId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CaseFailure {
    pub case_id: CaseId,
    pub stage:   &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id:            RunId,
    pub dry_run:           bool,
    pub cases_scanned:     u64,
    pub cases_normalized:  u64,
    pub duplicate_groups:  u64,
    pub alerts_created:    u64,
    pub scores_raised:     u64,
    pub cases_blocked:     u64,
    pub cases_released:    u64,
    pub conflicts_skipped: u64,
    pub failures:          Vec<CaseFailure>,
}

impl RunReport {
    pub fn new(run_id: RunId, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            ..Self::default()
        }
    }

    pub fn record_failure(
        &mut self,
        stage: &'static str,
        case_id: &CaseId,
        message: impl Into<String>,
    ) {
        let message = message.into();
        log::warn!("[{stage}] case {case_id}: {message}");
        self.failures.push(CaseFailure {
            case_id: case_id.clone(),
            stage,
            message,
        });
    }

    pub fn record_conflict(&mut self, stage: &'static str, case_id: &CaseId) {
        log::info!("[{stage}] case {case_id}: concurrent edit detected, skipping until next run");
        self.conflicts_skipped += 1;
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

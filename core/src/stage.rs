//! Stage trait and per-case write contract.
//!
//! RULE: Every enrichment stage implements EnrichStage.
//! The coordinator calls run() on each registered stage in registration
//! order, once per invocation. Execution order is fixed and documented
//! in engine.rs.
//!
//! Stage obligations:
//!   - page through the case set with the cursor API, never read-all,
//!   - skip Resolved cases (terminal, engine never touches them),
//!   - isolate per-case failures in the report and keep going,
//!   - skip (not retry) conflicted writes within the run,
//!   - honor dry-run: log the intended write, touch nothing.

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::report::RunReport;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{CaseStore, CaseUpdate, UpdateOutcome};
use crate::types::CaseId;

pub trait EnrichStage {
    /// Unique stable name, used in logs and failure records.
    fn name(&self) -> &'static str;

    /// Process the full case snapshot once.
    ///
    /// A returned error is a stage-level abort (e.g. the store died);
    /// per-case problems must be recorded in `report` instead.
    fn run(
        &self,
        store: &dyn CaseStore,
        clock: &dyn Clock,
        report: &mut RunReport,
    ) -> EngineResult<()>;
}

/// Commit one case's fieldset: version-guarded write with dry-run,
/// transient retry, and conflict-skip handling. Returns true when the
/// write landed (or would have, under dry-run).
pub(crate) fn apply_update(
    store: &dyn CaseStore,
    policy: &RetryPolicy,
    dry_run: bool,
    stage: &'static str,
    case_id: &CaseId,
    expected_version: i64,
    update: &CaseUpdate,
    report: &mut RunReport,
) -> bool {
    if dry_run {
        log::info!("[dry-run] {stage} would update case {case_id}: {update:?}");
        return true;
    }
    match with_retry(policy, stage, || {
        store.update_case(case_id, expected_version, update)
    }) {
        Ok(UpdateOutcome::Applied) => true,
        Ok(UpdateOutcome::Conflict) => {
            report.record_conflict(stage, case_id);
            false
        }
        Ok(UpdateOutcome::NotFound) => {
            report.record_failure(stage, case_id, "case disappeared during run");
            false
        }
        Err(err) => {
            report.record_failure(stage, case_id, err.to_string());
            false
        }
    }
}

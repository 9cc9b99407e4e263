//! Normalizer stage — fills safe defaults on half-formed intake records.
//!
//! Writes ONLY fields that are absent; a present value is never
//! overwritten, even if stale. A fully populated case produces no write
//! at all, which is what makes re-running this stage a no-op.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::stage::{apply_update, EnrichStage};
use crate::store::{CaseStore, CaseUpdate};

/// Neutral comment for cases that no rule has evaluated yet.
pub const DEFAULT_COMMENT: &str = "Auto-review pending: no risk signals evaluated yet.";

pub struct Normalizer {
    cfg: EngineConfig,
    retry: RetryPolicy,
}

impl Normalizer {
    pub fn new(cfg: EngineConfig) -> Self {
        let retry = RetryPolicy::from_config(&cfg);
        Self { cfg, retry }
    }
}

impl EnrichStage for Normalizer {
    fn name(&self) -> &'static str {
        "normalizer"
    }

    fn run(
        &self,
        store: &dyn CaseStore,
        _clock: &dyn Clock,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        let mut cursor = None;
        loop {
            let page = store.list_page(cursor.as_ref(), self.cfg.page_size)?;
            for (case_id, reason) in &page.malformed {
                report.cases_scanned += 1;
                report.record_failure(self.name(), case_id, reason.clone());
            }

            for case in &page.cases {
                report.cases_scanned += 1;
                if case.is_resolved() {
                    continue;
                }

                let mut update = CaseUpdate::default();
                if case.risk_score.is_none() {
                    update.risk_score = Some(self.cfg.default_risk_score);
                }
                if case.status.is_none() {
                    update.status = Some(crate::case::CaseStatus::Pending);
                }
                // An empty comment counts as absent: the post-run
                // guarantee is a non-empty ai_comment everywhere.
                if case.ai_comment.as_deref().map_or(true, str::is_empty) {
                    update.ai_comment = Some(DEFAULT_COMMENT.to_string());
                }
                // blocked_until: absent already reads as null, nothing to fill.

                if update.is_empty() {
                    continue;
                }
                if apply_update(
                    store,
                    &self.retry,
                    self.cfg.dry_run,
                    self.name(),
                    &case.case_id,
                    case.version,
                    &update,
                    report,
                ) {
                    report.cases_normalized += 1;
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        log::info!("normalizer: {} cases normalized", report.cases_normalized);
        Ok(())
    }
}

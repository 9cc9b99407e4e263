//! Auto-block engine — time-boxed blocking of high-risk cases.
//!
//! Per-case state machine, re-evaluated on every run:
//!
//!   Pending/UnderReview --(score > threshold)--> Blocked(now + window)
//!   Blocked(expired)    --------------------->   UnderReview (released)
//!   Blocked(unexpired)  untouched; the window is never extended or
//!                       reset by re-evaluation.
//!
//! A case released this run is not re-blocked until the next run's
//! evaluation — each case goes through the machine exactly once per run.

use crate::case::CaseStatus;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::stage::{apply_update, EnrichStage};
use crate::store::{CaseStore, CaseUpdate};
use chrono::{DateTime, Utc};

pub const RELEASE_COMMENT: &str = "Block window expired; case returned to review queue.";

fn block_comment(score: u8, until: DateTime<Utc>) -> String {
    format!("High risk (score {score}): SIM blocked until {}.", until.to_rfc3339())
}

pub struct AutoBlockEngine {
    cfg: EngineConfig,
    retry: RetryPolicy,
}

impl AutoBlockEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let retry = RetryPolicy::from_config(&cfg);
        Self { cfg, retry }
    }
}

impl EnrichStage for AutoBlockEngine {
    fn name(&self) -> &'static str {
        "auto_block"
    }

    fn run(
        &self,
        store: &dyn CaseStore,
        clock: &dyn Clock,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        let mut cursor = None;
        loop {
            let page = store.list_page(cursor.as_ref(), self.cfg.page_size)?;
            for (case_id, reason) in &page.malformed {
                report.record_failure(self.name(), case_id, reason.clone());
            }

            for case in &page.cases {
                let status = case.status_or_default();
                if status.is_terminal() {
                    continue;
                }
                let now = clock.now();

                if status == CaseStatus::Blocked {
                    match case.blocked_until {
                        Some(until) if now >= until => {
                            let update = CaseUpdate {
                                status: Some(CaseStatus::UnderReview),
                                blocked_until: Some(None),
                                ai_comment: Some(RELEASE_COMMENT.to_string()),
                                ..CaseUpdate::default()
                            };
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
                                report.cases_released += 1;
                            }
                        }
                        // Still inside the window: leave it alone.
                        Some(_) => {}
                        // Blocked without a window is an external
                        // invariant breach; surfaced, not auto-repaired.
                        None => {
                            report.record_failure(
                                self.name(),
                                &case.case_id,
                                "status is Blocked but blocked_until is null",
                            );
                        }
                    }
                    continue;
                }

                // Pending or UnderReview.
                let score = case.risk_score.unwrap_or(self.cfg.default_risk_score);
                if score > self.cfg.block_threshold {
                    let until = now + self.cfg.block_window();
                    let update = CaseUpdate {
                        status: Some(CaseStatus::Blocked),
                        blocked_until: Some(Some(until)),
                        ai_comment: Some(block_comment(score, until)),
                        ..CaseUpdate::default()
                    };
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
                        report.cases_blocked += 1;
                    }
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        log::info!(
            "auto-block: {} blocked, {} released",
            report.cases_blocked,
            report.cases_released
        );
        Ok(())
    }
}

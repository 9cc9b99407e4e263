//! Risk scorer — pluggable rule evaluation.
//!
//! The duplicate-SIM signal is applied by the detector stage; this
//! stage is the seam for additional signals (report velocity per
//! customer, device churn, ...). Rules fire independently over each
//! case; findings are combined as:
//!
//!   score  = min(100, current + sum of deltas)        (monotone)
//!   status = highest-severity suggestion, never Resolved,
//!            never a downgrade of the stored status
//!
//! A rule suggesting Blocked makes this stage set the block window too,
//! so the blocked_until <-> Blocked invariant holds no matter which
//! stage performs the transition.

use crate::case::{CaseStatus, FraudCase};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::stage::{apply_update, EnrichStage};
use crate::store::{CaseStore, CaseUpdate};

pub const MAX_RISK_SCORE: u8 = 100;

/// What one rule wants done to a case.
#[derive(Debug, Clone)]
pub struct RuleFinding {
    pub score_delta:       u8,
    pub status_suggestion: Option<CaseStatus>,
    pub comment:           String,
}

/// The contract every scoring rule fulfills. `evaluate` returns `None`
/// when the rule does not fire for this case.
pub trait ScoringRule: Send {
    fn name(&self) -> &'static str;
    fn evaluate(&self, case: &FraudCase) -> Option<RuleFinding>;
}

struct Combined {
    score:   u8,
    status:  Option<CaseStatus>,
    comment: Option<String>,
}

/// Fold fired findings into one outcome. Pure so the combination
/// semantics are testable without a store.
fn combine_findings(
    current_score: u8,
    current_status: CaseStatus,
    findings: &[RuleFinding],
) -> Combined {
    let total: u32 = current_score as u32
        + findings.iter().map(|f| f.score_delta as u32).sum::<u32>();
    let score = total.min(MAX_RISK_SCORE as u32) as u8;

    let status = findings
        .iter()
        .filter_map(|f| f.status_suggestion)
        .filter(|s| {
            if s.is_terminal() {
                // Resolved is set by external action only.
                log::warn!("scoring rule suggested Resolved; ignoring");
                false
            } else {
                true
            }
        })
        .max()
        .filter(|s| *s > current_status);

    // The comment belongs to the last rule that touched the case.
    let comment = findings.last().map(|f| f.comment.clone());

    Combined {
        score,
        status,
        comment,
    }
}

pub struct RiskScorer {
    cfg: EngineConfig,
    retry: RetryPolicy,
    rules: Vec<Box<dyn ScoringRule>>,
}

impl RiskScorer {
    /// Default pipeline configuration: no extra rules installed.
    pub fn new(cfg: EngineConfig) -> Self {
        Self::with_rules(cfg, Vec::new())
    }

    pub fn with_rules(cfg: EngineConfig, rules: Vec<Box<dyn ScoringRule>>) -> Self {
        let retry = RetryPolicy::from_config(&cfg);
        Self { cfg, retry, rules }
    }
}

impl EnrichStage for RiskScorer {
    fn name(&self) -> &'static str {
        "risk_scorer"
    }

    fn run(
        &self,
        store: &dyn CaseStore,
        clock: &dyn Clock,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        if self.rules.is_empty() {
            log::debug!("risk scorer: no rules installed, nothing to do");
            return Ok(());
        }

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
                let findings: Vec<RuleFinding> = self
                    .rules
                    .iter()
                    .filter_map(|rule| rule.evaluate(case))
                    .collect();
                if findings.is_empty() {
                    continue;
                }

                let current_score = case.risk_score.unwrap_or(self.cfg.default_risk_score);
                let combined =
                    combine_findings(current_score, case.status_or_default(), &findings);

                let mut update = CaseUpdate::default();
                if combined.score > current_score {
                    update.risk_score = Some(combined.score);
                }
                if let Some(status) = combined.status {
                    update.status = Some(status);
                    if status == CaseStatus::Blocked {
                        update.blocked_until =
                            Some(Some(clock.now() + self.cfg.block_window()));
                    }
                }
                if let Some(comment) = combined.comment {
                    if case.ai_comment.as_deref() != Some(comment.as_str()) {
                        update.ai_comment = Some(comment);
                    }
                }

                if update.is_empty() {
                    continue;
                }
                let raised = update.risk_score.is_some();
                if apply_update(
                    store,
                    &self.retry,
                    self.cfg.dry_run,
                    self.name(),
                    &case.case_id,
                    case.version,
                    &update,
                    report,
                ) && raised
                {
                    report.scores_raised += 1;
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(delta: u8, status: Option<CaseStatus>) -> RuleFinding {
        RuleFinding {
            score_delta: delta,
            status_suggestion: status,
            comment: format!("rule fired with delta {delta}"),
        }
    }

    #[test]
    fn deltas_sum_and_cap_at_100() {
        let combined = combine_findings(
            80,
            CaseStatus::Pending,
            &[finding(15, None), finding(30, None)],
        );
        assert_eq!(combined.score, 100);
    }

    #[test]
    fn score_never_decreases() {
        let combined = combine_findings(42, CaseStatus::Pending, &[finding(0, None)]);
        assert_eq!(combined.score, 42);
    }

    #[test]
    fn highest_severity_suggestion_wins() {
        let combined = combine_findings(
            10,
            CaseStatus::Pending,
            &[
                finding(5, Some(CaseStatus::UnderReview)),
                finding(5, Some(CaseStatus::Blocked)),
                finding(5, Some(CaseStatus::Pending)),
            ],
        );
        assert_eq!(combined.status, Some(CaseStatus::Blocked));
    }

    #[test]
    fn status_is_never_downgraded() {
        let combined = combine_findings(
            10,
            CaseStatus::Blocked,
            &[finding(5, Some(CaseStatus::UnderReview))],
        );
        assert_eq!(combined.status, None);
    }

    #[test]
    fn resolved_is_never_auto_assigned() {
        let combined = combine_findings(
            10,
            CaseStatus::Pending,
            &[finding(5, Some(CaseStatus::Resolved))],
        );
        assert_eq!(combined.status, None);
    }

    #[test]
    fn comment_comes_from_last_fired_rule() {
        let combined = combine_findings(
            10,
            CaseStatus::Pending,
            &[finding(1, None), finding(2, None)],
        );
        assert_eq!(
            combined.comment.as_deref(),
            Some("rule fired with delta 2")
        );
    }
}

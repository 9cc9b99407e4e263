//! Case and alert record types.

use crate::types::{CaseId, SimNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert type emitted for duplicate-SIM findings.
pub const ALERT_TYPE_DUPLICATE_SIM: &str = "Duplicate SIM";

/// Case lifecycle status.
///
/// Variants are declared in severity order, so the derived `Ord` IS the
/// severity order used when combining rule suggestions. `Resolved` is
/// terminal: set by external action only, never assigned or overridden
/// by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaseStatus {
    Pending,
    UnderReview,
    Blocked,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "Pending",
            CaseStatus::UnderReview => "UnderReview",
            CaseStatus::Blocked => "Blocked",
            CaseStatus::Resolved => "Resolved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(CaseStatus::Pending),
            "UnderReview" => Some(CaseStatus::UnderReview),
            "Blocked" => Some(CaseStatus::Blocked),
            "Resolved" => Some(CaseStatus::Resolved),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Resolved)
    }
}

/// One reported fraud incident.
///
/// `risk_score`, `status` and `ai_comment` may be absent on malformed
/// intake; the normalizer fills them. `version` is the optimistic
/// concurrency token checked on every engine write.
///
/// Invariant (after any run): `blocked_until.is_some()` iff
/// `status == Some(Blocked)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudCase {
    pub case_id:       CaseId,
    pub sim_number:    Option<SimNumber>,
    pub risk_score:    Option<u8>,
    pub status:        Option<CaseStatus>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub ai_comment:    Option<String>,
    pub customer_id:   String,
    pub description:   String,
    pub created_at:    DateTime<Utc>,
    pub version:       i64,
}

impl FraudCase {
    /// Status as seen by the stages; an absent status reads as `Pending`.
    pub fn status_or_default(&self) -> CaseStatus {
        self.status.unwrap_or(CaseStatus::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        self.status == Some(CaseStatus::Resolved)
    }
}

/// One duplicate-SIM finding. Append-only: never updated or deleted.
///
/// `case_ids` is the full sorted set of cases sharing the SIM at
/// detection time — a snapshot, not a live join. Sorted so repeated
/// detection of the same group produces a byte-identical payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub sim_number: String,
    pub alert_type: String,
    pub case_ids:   Vec<CaseId>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn duplicate_sim(
        sim: &SimNumber,
        mut case_ids: Vec<CaseId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        case_ids.sort();
        Self {
            sim_number: sim.as_str().to_string(),
            alert_type: ALERT_TYPE_DUPLICATE_SIM.to_string(),
            case_ids,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_matches_declaration_order() {
        assert!(CaseStatus::Pending < CaseStatus::UnderReview);
        assert!(CaseStatus::UnderReview < CaseStatus::Blocked);
        assert!(CaseStatus::Blocked < CaseStatus::Resolved);
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [
            CaseStatus::Pending,
            CaseStatus::UnderReview,
            CaseStatus::Blocked,
            CaseStatus::Resolved,
        ] {
            assert_eq!(CaseStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CaseStatus::parse("Open"), None);
    }

    #[test]
    fn duplicate_alert_sorts_case_ids() {
        let sim = crate::types::SimNumber::parse("0821234567").expect("valid sim");
        let alert = Alert::duplicate_sim(
            &sim,
            vec!["c-2".into(), "c-1".into()],
            Utc::now(),
        );
        assert_eq!(alert.case_ids, vec!["c-1".to_string(), "c-2".to_string()]);
        assert_eq!(alert.alert_type, ALERT_TYPE_DUPLICATE_SIM);
    }
}

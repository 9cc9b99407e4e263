//! Case record store — the engine's only persistence boundary.
//!
//! RULE: Only this module talks to the database.
//! Stages call store methods — they never execute SQL directly.
//!
//! Every engine write is a conditional update guarded by the version
//! read at stage start, so a reviewer editing a case mid-run is never
//! clobbered: the write comes back `Conflict` and the case is skipped
//! until the next run.

use crate::case::{Alert, CaseStatus, FraudCase};
use crate::error::{EngineError, EngineResult};
use crate::types::{CaseId, SimNumber};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

/// Engine-owned fields for one conditional write. Fields left `None`
/// are not touched. `blocked_until` distinguishes "leave alone" from
/// "set or clear" with the nested option.
#[derive(Debug, Clone, Default)]
pub struct CaseUpdate {
    pub risk_score:    Option<u8>,
    pub status:        Option<CaseStatus>,
    pub blocked_until: Option<Option<DateTime<Utc>>>,
    pub ai_comment:    Option<String>,
}

impl CaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.risk_score.is_none()
            && self.status.is_none()
            && self.blocked_until.is_none()
            && self.ai_comment.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The stored version no longer matches: an external writer got
    /// there first. Never retried within the same run.
    Conflict,
    NotFound,
}

/// One page of a cursor read.
#[derive(Debug, Default)]
pub struct CasePage {
    pub cases: Vec<FraudCase>,
    /// Rows that failed validation, as (case_id, reason). Surfaced so
    /// the caller can count them as per-case failures instead of
    /// aborting the page.
    pub malformed: Vec<(CaseId, String)>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<CaseId>,
}

/// The record store consumed by the engine. Case intake, review edits
/// and resolution happen outside; the engine only reads snapshots,
/// writes its own fields conditionally, and appends alerts.
pub trait CaseStore {
    /// Keyset-paginated snapshot read, ordered by case id. Not
    /// transactionally consistent across pages.
    fn list_page(&self, cursor: Option<&CaseId>, limit: usize) -> EngineResult<CasePage>;

    fn get_case(&self, case_id: &CaseId) -> EngineResult<Option<FraudCase>>;

    /// Version-guarded partial update of engine-owned fields.
    fn update_case(
        &self,
        case_id: &CaseId,
        expected_version: i64,
        update: &CaseUpdate,
    ) -> EngineResult<UpdateOutcome>;

    /// Insert-only. Returns the new alert's row id.
    fn append_alert(&self, alert: &Alert) -> EngineResult<i64>;

    /// Whether an identical duplicate-SIM alert (same SIM, same sorted
    /// case-id set) already exists. Read-side check; the alert table
    /// itself stays append-only.
    fn duplicate_alert_exists(&self, sim_number: &str, case_ids: &[CaseId]) -> EngineResult<bool>;

    /// Intake helper used by seeding and tests; case creation itself is
    /// external to the engine.
    fn insert_case(&self, case: &FraudCase) -> EngineResult<()>;

    /// Cheap probe used as the fatal-error preflight and for summaries.
    fn case_count(&self) -> EngineResult<i64>;

    fn list_alerts(&self) -> EngineResult<Vec<Alert>>;

    /// Take the single run-level lease if it is free, expired, or
    /// already ours. Returns false when another invocation holds it.
    fn try_acquire_lease(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EngineResult<bool>;

    fn release_lease(&self, holder: &str) -> EngineResult<()>;
}

// ── SQLite implementation ────────────────────────────────────────────────────

pub struct SqliteCaseStore {
    conn: Connection,
}

/// Columns as stored, before validation.
struct RawCase {
    case_id:       String,
    sim_number:    Option<String>,
    risk_score:    Option<i64>,
    status:        Option<String>,
    blocked_until: Option<i64>,
    ai_comment:    Option<String>,
    customer_id:   String,
    description:   String,
    created_at:    i64,
    version:       i64,
}

const CASE_COLUMNS: &str = "case_id, sim_number, risk_score, status, blocked_until, \
                            ai_comment, customer_id, description, created_at, version";

impl SqliteCaseStore {
    /// Open (or create) the case database at `path`.
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only works for real files; ignore failures elsewhere.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_cases.sql"))?;
        Ok(())
    }

    fn raw_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCase> {
        Ok(RawCase {
            case_id:       row.get(0)?,
            sim_number:    row.get(1)?,
            risk_score:    row.get(2)?,
            status:        row.get(3)?,
            blocked_until: row.get(4)?,
            ai_comment:    row.get(5)?,
            customer_id:   row.get(6)?,
            description:   row.get(7)?,
            created_at:    row.get(8)?,
            version:       row.get(9)?,
        })
    }
}

impl RawCase {
    fn into_case(self) -> Result<FraudCase, String> {
        let risk_score = match self.risk_score {
            None => None,
            Some(n) if (0..=100).contains(&n) => Some(n as u8),
            Some(n) => return Err(format!("risk_score {n} out of range [0,100]")),
        };
        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => {
                Some(CaseStatus::parse(raw).ok_or_else(|| format!("unknown status '{raw}'"))?)
            }
        };
        let blocked_until = match self.blocked_until {
            None => None,
            Some(secs) => Some(
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| format!("blocked_until {secs} is not a valid timestamp"))?,
            ),
        };
        let created_at = DateTime::from_timestamp(self.created_at, 0)
            .ok_or_else(|| format!("created_at {} is not a valid timestamp", self.created_at))?;
        Ok(FraudCase {
            sim_number: self.sim_number.as_deref().and_then(SimNumber::parse),
            case_id: self.case_id,
            risk_score,
            status,
            blocked_until,
            ai_comment: self.ai_comment,
            customer_id: self.customer_id,
            description: self.description,
            created_at,
            version: self.version,
        })
    }
}

impl CaseStore for SqliteCaseStore {
    fn list_page(&self, cursor: Option<&CaseId>, limit: usize) -> EngineResult<CasePage> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CASE_COLUMNS} FROM fraud_case
             WHERE ?1 IS NULL OR case_id > ?1
             ORDER BY case_id ASC LIMIT ?2"
        ))?;
        let raws = stmt
            .query_map(params![cursor, limit as i64], SqliteCaseStore::raw_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut page = CasePage {
            next_cursor: (raws.len() == limit)
                .then(|| raws.last().map(|r| r.case_id.clone()))
                .flatten(),
            ..CasePage::default()
        };
        for raw in raws {
            let case_id = raw.case_id.clone();
            match raw.into_case() {
                Ok(case) => page.cases.push(case),
                Err(reason) => page.malformed.push((case_id, reason)),
            }
        }
        Ok(page)
    }

    fn get_case(&self, case_id: &CaseId) -> EngineResult<Option<FraudCase>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {CASE_COLUMNS} FROM fraud_case WHERE case_id = ?1"),
                params![case_id],
                SqliteCaseStore::raw_from_row,
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(raw) => raw
                .into_case()
                .map(Some)
                .map_err(|reason| EngineError::MalformedCase {
                    case_id: case_id.clone(),
                    reason,
                }),
        }
    }

    fn update_case(
        &self,
        case_id: &CaseId,
        expected_version: i64,
        update: &CaseUpdate,
    ) -> EngineResult<UpdateOutcome> {
        if update.is_empty() {
            return Ok(UpdateOutcome::Applied);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(score) = update.risk_score {
            sets.push("risk_score = ?");
            values.push(Box::new(score as i64));
        }
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(until) = &update.blocked_until {
            sets.push("blocked_until = ?");
            values.push(Box::new(until.map(|t| t.timestamp())));
        }
        if let Some(comment) = &update.ai_comment {
            sets.push("ai_comment = ?");
            values.push(Box::new(comment.clone()));
        }
        sets.push("version = version + 1");

        let sql = format!(
            "UPDATE fraud_case SET {} WHERE case_id = ? AND version = ?",
            sets.join(", ")
        );
        values.push(Box::new(case_id.clone()));
        values.push(Box::new(expected_version));

        let affected = self
            .conn
            .execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        if affected == 1 {
            return Ok(UpdateOutcome::Applied);
        }

        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM fraud_case WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match exists {
            Some(_) => UpdateOutcome::Conflict,
            None => UpdateOutcome::NotFound,
        })
    }

    fn append_alert(&self, alert: &Alert) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO alert (sim_number, alert_type, case_ids, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                alert.sim_number,
                alert.alert_type,
                serde_json::to_string(&alert.case_ids)?,
                alert.created_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn duplicate_alert_exists(&self, sim_number: &str, case_ids: &[CaseId]) -> EngineResult<bool> {
        let payload = serde_json::to_string(case_ids)?;
        let found: i64 = self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM alert
                 WHERE sim_number = ?1 AND alert_type = ?2 AND case_ids = ?3
             )",
            params![sim_number, crate::case::ALERT_TYPE_DUPLICATE_SIM, payload],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }

    fn insert_case(&self, case: &FraudCase) -> EngineResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO fraud_case ({CASE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                case.case_id,
                case.sim_number.as_ref().map(|s| s.as_str()),
                case.risk_score.map(|n| n as i64),
                case.status.map(|s| s.as_str()),
                case.blocked_until.map(|t| t.timestamp()),
                case.ai_comment,
                case.customer_id,
                case.description,
                case.created_at.timestamp(),
                case.version,
            ],
        )?;
        Ok(())
    }

    fn case_count(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM fraud_case", [], |row| row.get(0))?)
    }

    fn list_alerts(&self) -> EngineResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT sim_number, alert_type, case_ids, created_at
             FROM alert ORDER BY id ASC",
        )?;
        let raws = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut alerts = Vec::with_capacity(raws.len());
        for (sim_number, alert_type, payload, created) in raws {
            alerts.push(Alert {
                sim_number,
                alert_type,
                case_ids: serde_json::from_str(&payload)?,
                created_at: DateTime::from_timestamp(created, 0).ok_or_else(|| {
                    EngineError::Other(anyhow::anyhow!("alert created_at {created} invalid"))
                })?,
            });
        }
        Ok(alerts)
    }

    fn try_acquire_lease(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EngineResult<bool> {
        let affected = self.conn.execute(
            "INSERT INTO run_lease (id, holder, expires_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE
                 SET holder = excluded.holder, expires_at = excluded.expires_at
                 WHERE run_lease.expires_at <= ?3 OR run_lease.holder = ?1",
            params![holder, (now + ttl).timestamp(), now.timestamp()],
        )?;
        Ok(affected == 1)
    }

    fn release_lease(&self, holder: &str) -> EngineResult<()> {
        self.conn.execute(
            "DELETE FROM run_lease WHERE holder = ?1",
            params![holder],
        )?;
        Ok(())
    }
}

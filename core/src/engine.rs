//! The run coordinator — wires the four stages and owns run-level
//! concerns: the preflight probe, the lease, and the report.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Normalizer
//!   2. Duplicate detector   (full-snapshot barrier)
//!   3. Risk scorer
//!   4. Auto-block engine
//!
//! RULES:
//!   - Stages execute in registration order, once per run.
//!   - Each stage commits its fields per case before the next stage
//!     begins; there are no multi-stage writes for a single case.
//!   - A per-case failure never aborts the run; it lands in the report.
//!   - Two invocations never overlap: the run lease is mutually
//!     exclusive per deployment, with a TTL so a crashed run cannot
//!     wedge the schedule.

use crate::autoblock::AutoBlockEngine;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::duplicate_detector::DuplicateDetector;
use crate::error::{EngineError, EngineResult};
use crate::normalizer::Normalizer;
use crate::report::RunReport;
use crate::risk_scorer::RiskScorer;
use crate::stage::EnrichStage;
use crate::store::CaseStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct EnrichEngine {
    cfg: EngineConfig,
    clock: Arc<dyn Clock>,
    stages: Vec<Box<dyn EnrichStage>>,
}

impl EnrichEngine {
    /// An engine with no stages. Use `build` for the full pipeline;
    /// this exists for tests exercising a single stage.
    pub fn new(cfg: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            stages: Vec::new(),
        }
    }

    /// Build the fully wired pipeline in the documented execution order.
    pub fn build(cfg: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let mut engine = Self::new(cfg.clone(), clock);
        engine.register(Box::new(Normalizer::new(cfg.clone())));
        engine.register(Box::new(DuplicateDetector::new(cfg.clone())));
        engine.register(Box::new(RiskScorer::new(cfg.clone())));
        engine.register(Box::new(AutoBlockEngine::new(cfg)));
        engine
    }

    /// Register a stage. Call in the documented execution order.
    pub fn register(&mut self, stage: Box<dyn EnrichStage>) {
        self.stages.push(stage);
    }

    /// One complete invocation over the full case snapshot.
    ///
    /// Fatal errors (store unreachable, lease held) return `Err` before
    /// any write; everything per-case is inside the returned report.
    pub fn run_once(&self, store: &dyn CaseStore) -> EngineResult<RunReport> {
        // Preflight: if the store is unreachable, fail before any write.
        let total = store.case_count()?;

        let holder = format!("sweep-{}", Uuid::new_v4());
        let now = self.clock.now();
        if !store.try_acquire_lease(&holder, now, self.cfg.lease_ttl())? {
            return Err(EngineError::LeaseHeld);
        }

        let run_id = format!("run-{}", Uuid::new_v4());
        log::info!(
            "{run_id}: starting over {total} cases (dry_run={})",
            self.cfg.dry_run
        );
        let mut report = RunReport::new(run_id, self.cfg.dry_run);

        let result = self.run_stages(store, &mut report);
        // Give the lease back even when a stage aborted.
        let released = store.release_lease(&holder);
        result?;
        released?;

        log::info!(
            "{}: done — {} scanned, {} normalized, {} duplicate groups, \
             {} alerts, {} blocked, {} released, {} conflicts, {} failures",
            report.run_id,
            report.cases_scanned,
            report.cases_normalized,
            report.duplicate_groups,
            report.alerts_created,
            report.cases_blocked,
            report.cases_released,
            report.conflicts_skipped,
            report.failures.len()
        );
        Ok(report)
    }

    fn run_stages(&self, store: &dyn CaseStore, report: &mut RunReport) -> EngineResult<()> {
        for stage in &self.stages {
            log::debug!("stage {} starting", stage.name());
            stage.run(store, self.clock.as_ref(), report)?;
        }
        Ok(())
    }
}

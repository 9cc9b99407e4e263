//! simfraud-core: periodic enrichment engine for SIM fraud cases.
//!
//! One run scans the full case snapshot through the store interface and
//! executes four stages in fixed order — normalizer, duplicate-SIM
//! detector, risk scorer, auto-block engine. Each stage writes back
//! only the fields it owns, through version-guarded conditional updates
//! so a human reviewer editing a case mid-run is never clobbered. Runs
//! are re-runnable: a second pass over unchanged data writes nothing.

pub mod autoblock;
pub mod case;
pub mod clock;
pub mod config;
pub mod duplicate_detector;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod report;
pub mod retry;
pub mod risk_scorer;
pub mod stage;
pub mod store;
pub mod types;

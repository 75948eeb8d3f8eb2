//! Stage-level building blocks: health gating, stage execution and forced cleanup.

pub mod executor;
pub mod health;
pub mod reconcile;

pub use executor::{StageExecutor, StageOutcome};
pub use health::{GateOutcome, HealthGate};
pub use reconcile::{CleanupTask, ReconcileOutcome, Reconciler};

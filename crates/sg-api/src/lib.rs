mod budget;
mod client;
mod host;
mod orchestrator;
mod patch;

pub use budget::{BudgetSnapshot, CorrectionBudget};
pub use client::{CorrectionClient, RecordedRequest, ReplayCorrectionClient};
pub use host::{CorrectionProgress, UnitHost, UnitSurface};
pub use orchestrator::{CorrectionOrchestrator, CorrectionStep, PendingCorrection};
pub use patch::{apply_patch, PatchOutcome};

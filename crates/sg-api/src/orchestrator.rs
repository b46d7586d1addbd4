use sg_compiler::{prepare_source, PreparedSource};
use sg_core::{
    validate_parameters, CodeVersion, CorrectionAttempt, CorrectionRequest, CorrectionResponse,
    FailureReport, GeneratedModule, GuardConfig, ParameterSpec, PatchEdit, RetryRequest,
    SceneGuardError, UnitId,
};

use crate::budget::CorrectionBudget;
use crate::patch::{apply_patch, unmatched_error};

/// An in-flight correction for one unit, captured at a specific code version.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCorrection {
    pub unit_id: UnitId,
    pub version: CodeVersion,
    pub request: CorrectionRequest,
    retry_base: Option<String>,
    applied_edits: Vec<PatchEdit>,
    explanation: String,
}

impl PendingCorrection {
    pub fn is_retry(&self) -> bool {
        self.retry_base.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionStep {
    /// Some edits did not match; the collaborator gets exactly one retry.
    Retry(RetryRequest),
    /// The patched code validated and is ready to become the next version.
    Patched {
        code: String,
        prepared: PreparedSource,
        parameters: Vec<ParameterSpec>,
        attempt: CorrectionAttempt,
    },
    Failed {
        error: SceneGuardError,
        attempt: CorrectionAttempt,
    },
}

/// Budgeted request/apply/verify cycle. Host-agnostic: callers own the unit
/// state and the collaborator round-trip.
#[derive(Debug, Clone)]
pub struct CorrectionOrchestrator {
    config: GuardConfig,
    budget: CorrectionBudget,
}

impl CorrectionOrchestrator {
    pub fn new(config: GuardConfig, budget: CorrectionBudget) -> Self {
        Self { config, budget }
    }

    pub fn budget(&self) -> &CorrectionBudget {
        &self.budget
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Consumes budget and builds the patch request. Fails without side effects
    /// on the counters when the budget is exhausted.
    pub fn begin(
        &self,
        unit_id: &UnitId,
        module: &GeneratedModule,
        failure: &FailureReport,
        static_warnings: Vec<String>,
    ) -> Result<PendingCorrection, SceneGuardError> {
        self.budget.try_consume(unit_id)?;
        let request = CorrectionRequest {
            prior_code: module.raw_code.clone(),
            parameters: module.parameters.clone(),
            error_message: format!("[{}] {}", failure.kind.label(), failure.message),
            stack_trace: failure
                .stack
                .as_deref()
                .map(|stack| truncate_chars(stack, self.config.correction.stack_trace_chars)),
            static_warnings,
        };
        log::info!(
            "requesting correction for {} at {}: {}",
            unit_id,
            module.version,
            request.error_message
        );
        Ok(PendingCorrection {
            unit_id: unit_id.clone(),
            version: module.version,
            request,
            retry_base: None,
            applied_edits: Vec::new(),
            explanation: String::new(),
        })
    }

    /// Applies a collaborator response to the pending correction.
    pub fn complete(
        &self,
        pending: &mut PendingCorrection,
        response: &CorrectionResponse,
    ) -> CorrectionStep {
        let base = pending
            .retry_base
            .clone()
            .unwrap_or_else(|| pending.request.prior_code.clone());
        let outcome = apply_patch(&base, &response.edits);
        pending.applied_edits.extend(
            response
                .edits
                .iter()
                .filter(|edit| !outcome.unmatched.contains(*edit))
                .cloned(),
        );
        if !response.explanation.is_empty() {
            if !pending.explanation.is_empty() {
                pending.explanation.push('\n');
            }
            pending.explanation.push_str(&response.explanation);
        }

        if !outcome.is_complete() {
            if !pending.is_retry() {
                log::warn!(
                    "{} of {} edits did not match for {}; requesting one retry",
                    outcome.unmatched.len(),
                    response.edits.len(),
                    pending.unit_id
                );
                pending.retry_base = Some(outcome.code.clone());
                return CorrectionStep::Retry(RetryRequest {
                    current_code: outcome.code,
                    failed_edits: outcome.unmatched,
                    request: pending.request.clone(),
                });
            }
            return self.fail(pending, unmatched_error(&outcome.unmatched));
        }

        let parameters = response
            .parameters
            .clone()
            .unwrap_or_else(|| pending.request.parameters.clone());
        if let Err(error) = validate_parameters(&parameters) {
            return self.fail(pending, error);
        }

        let prepared = prepare_source(&outcome.code, &self.config);
        if !prepared.is_runnable() {
            let detail = prepared
                .validation
                .first_error_message()
                .unwrap_or_else(|| "patched code is not runnable".to_string());
            return self.fail(
                pending,
                SceneGuardError::new(
                    "CORRECTION_VALIDATION_FAILED",
                    format!("Patched code failed validation: {}.", detail),
                ),
            );
        }

        log::info!("correction for {} verified", pending.unit_id);
        CorrectionStep::Patched {
            code: outcome.code,
            prepared,
            parameters,
            attempt: attempt_record(pending, true),
        }
    }

    fn fail(&self, pending: &PendingCorrection, error: SceneGuardError) -> CorrectionStep {
        log::warn!("correction for {} failed: {}", pending.unit_id, error);
        CorrectionStep::Failed {
            error,
            attempt: attempt_record(pending, false),
        }
    }
}

fn attempt_record(pending: &PendingCorrection, success: bool) -> CorrectionAttempt {
    CorrectionAttempt {
        prior_code: pending.request.prior_code.clone(),
        error_message: pending.request.error_message.clone(),
        stack_trace: pending.request.stack_trace.clone(),
        static_warnings: pending.request.static_warnings.clone(),
        edits: pending.applied_edits.clone(),
        explanation: pending.explanation.clone(),
        success,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

use std::path::Path;

use sg_api::{ReplayCorrectionClient, UnitHost, UnitSurface};
use sg_compiler::prepare_source;
use sg_core::{
    FailureKind, FailureReport, GuardConfig, ModuleState, SceneGuardError, UnitDescriptor,
    UnitId, ValidationReport,
};

use crate::source::{find_case_dirs, read_file, read_test_case, read_unit_source};
use crate::{CorrectionCase, ExpectedState, SgToolError, TestCase};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub validation: ValidationReport,
    pub warnings: Vec<String>,
    pub fix_categories: Vec<String>,
    pub sanitized_text: Option<String>,
    pub correction: Option<CorrectionOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub surface: UnitSurface,
    pub error_code: Option<String>,
    pub requests: usize,
    pub code: String,
}

pub fn run_case(case_dir: &Path, case: &TestCase) -> Result<RunReport, SgToolError> {
    let config = case.config.clone().unwrap_or_default();
    let descriptor = read_unit_source(case_dir, case)?;
    let prepared = prepare_source(&descriptor.source_text, &config);

    let correction = match &case.correction {
        Some(correction) => Some(run_correction(
            config,
            &unit_id_for(case_dir),
            descriptor,
            correction,
        )?),
        None => None,
    };

    Ok(RunReport {
        warnings: prepared.static_warnings(),
        fix_categories: prepared
            .sanitized
            .as_ref()
            .map(|sanitized| {
                sanitized
                    .fixes_applied
                    .iter()
                    .map(|fix| fix.category.clone())
                    .collect()
            })
            .unwrap_or_default(),
        sanitized_text: prepared
            .sanitized
            .as_ref()
            .map(|sanitized| sanitized.sanitized_text.clone()),
        validation: prepared.validation,
        correction,
    })
}

fn run_correction(
    config: GuardConfig,
    unit_id: &UnitId,
    descriptor: UnitDescriptor,
    correction: &CorrectionCase,
) -> Result<CorrectionOutcome, SgToolError> {
    let mut host = UnitHost::new(config);
    host.load_unit(unit_id, descriptor)?;
    let failure = match &correction.runtime_error {
        Some(message) => FailureReport::new(FailureKind::RenderPhase, message.clone())
            .with_static_warnings(
                host.prepared(unit_id)
                    .map(|prepared| prepared.static_warnings())
                    .unwrap_or_default(),
            ),
        None => host
            .static_failure(unit_id)
            .ok_or(SgToolError::NothingToCorrect)?,
    };

    let client = ReplayCorrectionClient::new(correction.responses.clone());
    let error_code = host
        .run_correction(unit_id, failure, &client)
        .err()
        .map(|error| error.code);
    let surface = host.surface(unit_id).ok_or_else(|| {
        SceneGuardError::new("UNIT_NOT_FOUND", format!("Unit {} is not loaded.", unit_id))
    })?;
    let code = host
        .module(unit_id)
        .map(|module| module.raw_code.clone())
        .unwrap_or_default();

    Ok(CorrectionOutcome {
        surface,
        error_code,
        requests: client.requests().len(),
        code,
    })
}

fn unit_id_for(case_dir: &Path) -> UnitId {
    UnitId::new(
        case_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "unit".to_string()),
    )
}

pub fn assert_case(case_dir: &Path) -> Result<(), SgToolError> {
    let case = read_test_case(&case_dir.join("case.json"))?;
    let report = run_case(case_dir, &case)?;

    let errors = report
        .validation
        .errors
        .iter()
        .map(|error| format!("{} (line {})", error.message, error.line))
        .collect::<Vec<_>>();
    if report.validation.valid != case.expect_valid {
        return Err(SgToolError::ValidityMismatch {
            expected: case.expect_valid,
            actual: report.validation.valid,
            errors: to_json(&errors)?,
        });
    }
    compare_list("errors", &case.expected_errors, &errors)?;
    if let Some(expected) = &case.expected_warnings {
        compare_list("warnings", expected, &report.warnings)?;
    }
    if let Some(expected) = &case.expected_fix_categories {
        compare_list("fix categories", expected, &report.fix_categories)?;
    }

    let sanitized = report.sanitized_text.clone().unwrap_or_default();
    if let Some(file) = &case.expected_sanitized_file {
        let path = case_dir.join(file);
        let expected = read_file(&path)?;
        if expected.trim_end() != sanitized.trim_end() {
            return Err(SgToolError::SanitizedMismatch {
                path,
                expected,
                actual: sanitized,
            });
        }
    }
    require_all("sanitized text", &case.sanitized_contains, &sanitized)?;

    if let (Some(expected), Some(actual)) = (&case.correction, &report.correction) {
        assert_correction(expected, actual)?;
    }
    Ok(())
}

fn assert_correction(
    expected: &CorrectionCase,
    actual: &CorrectionOutcome,
) -> Result<(), SgToolError> {
    let wanted = match expected.expected_state {
        ExpectedState::Valid => ModuleState::Valid,
        ExpectedState::GivenUp => ModuleState::GivenUp,
    };
    if actual.surface.state != wanted {
        return Err(SgToolError::CorrectionStateMismatch {
            expected: wanted.to_string(),
            actual: actual.surface.state.to_string(),
        });
    }
    if expected.expected_error_code != actual.error_code {
        return Err(SgToolError::CorrectionCodeMismatch {
            expected: expected
                .expected_error_code
                .clone()
                .unwrap_or_else(|| "none".to_string()),
            actual: actual
                .error_code
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        });
    }
    if let Some(requests) = expected.expected_requests {
        if requests != actual.requests {
            return Err(SgToolError::ListMismatch {
                label: "request count",
                expected: requests.to_string(),
                actual: actual.requests.to_string(),
            });
        }
    }
    require_all("corrected code", &expected.code_contains, &actual.code)
}

/// Runs every case under `root`, returning how many passed.
pub fn assert_all(root: &Path) -> Result<usize, SgToolError> {
    let dirs = find_case_dirs(root)?;
    for dir in &dirs {
        assert_case(dir).map_err(|source| SgToolError::Case {
            case: dir.clone(),
            source: Box::new(source),
        })?;
    }
    Ok(dirs.len())
}

fn compare_list(
    label: &'static str,
    expected: &[String],
    actual: &[String],
) -> Result<(), SgToolError> {
    if expected == actual {
        return Ok(());
    }
    Err(SgToolError::ListMismatch {
        label,
        expected: to_json(expected)?,
        actual: to_json(actual)?,
    })
}

fn require_all(label: &'static str, needles: &[String], haystack: &str) -> Result<(), SgToolError> {
    match needles.iter().find(|needle| !haystack.contains(needle.as_str())) {
        Some(needle) => Err(SgToolError::MissingText {
            label,
            needle: needle.clone(),
        }),
        None => Ok(()),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, SgToolError> {
    serde_json::to_string(value).map_err(SgToolError::Serialize)
}

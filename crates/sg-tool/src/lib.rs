mod case;
mod runner;
mod source;

pub use case::{CorrectionCase, ExpectedState, TestCase, TESTCASE_SCHEMA_V1};
pub use runner::{assert_all, assert_case, run_case, CorrectionOutcome, RunReport};
pub use source::{find_case_dirs, read_test_case, read_unit_source};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SgToolError {
    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse testcase {path}: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid testcase schema version \"{found}\", expected \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No case.json files under {path}.")]
    CasesEmpty { path: PathBuf },
    #[error("Guard error: {0}")]
    Guard(#[from] sg_core::SceneGuardError),
    #[error("Validity mismatch: expected valid={expected}, actual valid={actual}. errors={errors}")]
    ValidityMismatch {
        expected: bool,
        actual: bool,
        errors: String,
    },
    #[error("{label} mismatch. expected={expected} actual={actual}")]
    ListMismatch {
        label: &'static str,
        expected: String,
        actual: String,
    },
    #[error("Sanitized output differs from {path}.\nexpected:\n{expected}\nactual:\n{actual}")]
    SanitizedMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("{label} is missing \"{needle}\".")]
    MissingText { label: &'static str, needle: String },
    #[error("Case has a correction block but the unit needs no correction.")]
    NothingToCorrect,
    #[error("Correction ended in state {actual}, expected {expected}.")]
    CorrectionStateMismatch { expected: String, actual: String },
    #[error("Correction error code mismatch: expected {expected}, actual {actual}.")]
    CorrectionCodeMismatch { expected: String, actual: String },
    #[error("Case {case} failed: {source}")]
    Case {
        case: PathBuf,
        source: Box<SgToolError>,
    },
    #[error("Failed to serialize value for diff: {0}")]
    Serialize(serde_json::Error),
}

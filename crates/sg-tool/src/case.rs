use serde::{Deserialize, Serialize};
use sg_core::{CorrectionResponse, GuardConfig};

pub const TESTCASE_SCHEMA_V1: &str = "sg-tool-case.v1";

/// One golden fixture: a unit source plus what validation, sanitization and
/// an optional replayed correction must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_unit_file")]
    pub unit_file: String,
    #[serde(default)]
    pub config: Option<GuardConfig>,
    pub expect_valid: bool,
    /// Formatted as `<message> (line N)`.
    #[serde(default)]
    pub expected_errors: Vec<String>,
    #[serde(default)]
    pub expected_warnings: Option<Vec<String>>,
    #[serde(default)]
    pub expected_fix_categories: Option<Vec<String>>,
    /// Golden file compared with the sanitized text, ignoring trailing whitespace.
    #[serde(default)]
    pub expected_sanitized_file: Option<String>,
    #[serde(default)]
    pub sanitized_contains: Vec<String>,
    #[serde(default)]
    pub correction: Option<CorrectionCase>,
}

fn default_unit_file() -> String {
    "unit.js".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionCase {
    /// Replays as a render-phase failure; otherwise the validation failure is corrected.
    #[serde(default)]
    pub runtime_error: Option<String>,
    pub responses: Vec<CorrectionResponse>,
    pub expected_state: ExpectedState,
    #[serde(default)]
    pub expected_error_code: Option<String>,
    #[serde(default)]
    pub expected_requests: Option<usize>,
    #[serde(default)]
    pub code_contains: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpectedState {
    Valid,
    GivenUp,
}

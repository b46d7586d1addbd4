use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SceneGuardError;
use crate::value::SgValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self::point(SourceLocation { line: 1, column: 1 })
    }

    pub fn point(location: SourceLocation) -> Self {
        Self {
            start: location,
            end: location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeVersion(pub u64);

impl fmt::Display for CodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Slider,
    Toggle,
    Button,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub default_value: Option<SgValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDescriptor {
    pub source_text: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl UnitDescriptor {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            parameters: Vec::new(),
        }
    }
}

pub fn validate_parameters(parameters: &[ParameterSpec]) -> Result<(), SceneGuardError> {
    let mut seen = BTreeSet::new();
    for parameter in parameters {
        if parameter.name.trim().is_empty() {
            return Err(SceneGuardError::new(
                "PARAMETER_INVALID",
                "Parameter name must not be empty.",
            ));
        }
        if !seen.insert(parameter.name.as_str()) {
            return Err(SceneGuardError::new(
                "PARAMETER_INVALID",
                format!("Duplicate parameter \"{}\".", parameter.name),
            ));
        }
        if parameter.kind != ParameterKind::Slider {
            continue;
        }
        if let (Some(min), Some(max)) = (parameter.min, parameter.max) {
            if min > max {
                return Err(SceneGuardError::new(
                    "PARAMETER_INVALID",
                    format!(
                        "Slider \"{}\" has min {} greater than max {}.",
                        parameter.name, min, max
                    ),
                ));
            }
        }
        if let Some(step) = parameter.step {
            if step <= 0.0 {
                return Err(SceneGuardError::new(
                    "PARAMETER_INVALID",
                    format!("Slider \"{}\" must have a positive step.", parameter.name),
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleState {
    Unvalidated,
    Valid,
    Correcting,
    GivenUp,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unvalidated => "unvalidated",
            Self::Valid => "valid",
            Self::Correcting => "correcting",
            Self::GivenUp => "givenUp",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedModule {
    pub version: CodeVersion,
    pub raw_code: String,
    pub sanitized_code: String,
    pub parameters: Vec<ParameterSpec>,
    pub state: ModuleState,
}

impl GeneratedModule {
    pub fn with_state(&self, state: ModuleState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationErrorKind {
    UndefinedIdentifier,
    Tdz,
    Syntax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_name: Option<String>,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn from_parts(errors: Vec<ValidationError>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn first_error_message(&self) -> Option<String> {
        self.errors
            .first()
            .map(|error| format!("{} (line {})", error.message, error.line))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecord {
    pub category: String,
    pub description: String,
}

impl FixRecord {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizeOutput {
    pub sanitized_text: String,
    pub fixes_applied: Vec<FixRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEdit {
    pub search_text: String,
    pub replace_text: String,
}

impl PatchEdit {
    pub fn new(search_text: impl Into<String>, replace_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            replace_text: replace_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRequest {
    pub prior_code: String,
    pub parameters: Vec<ParameterSpec>,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub current_code: String,
    pub failed_edits: Vec<PatchEdit>,
    pub request: CorrectionRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResponse {
    pub explanation: String,
    pub edits: Vec<PatchEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionAttempt {
    pub prior_code: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_warnings: Vec<String>,
    pub edits: Vec<PatchEdit>,
    pub explanation: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    StaticValidation,
    RenderPhase,
    PerFrame,
    EventHandler,
    MissingOutput,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::StaticValidation => "static-validation",
            Self::RenderPhase => "render-phase",
            Self::PerFrame => "per-frame",
            Self::EventHandler => "event-handler",
            Self::MissingOutput => "missing-output",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_warnings: Vec<String>,
}

impl FailureReport {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            static_warnings: Vec::new(),
        }
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_static_warnings(mut self, warnings: Vec<String>) -> Self {
        self.static_warnings = warnings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slider(name: &str, min: f64, max: f64, step: f64) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            kind: ParameterKind::Slider,
            min: Some(min),
            max: Some(max),
            step: Some(step),
            default_value: Some(SgValue::Number(min)),
        }
    }

    #[test]
    fn unit_descriptor_deserializes_camel_case_parameters() {
        let descriptor: UnitDescriptor = serde_json::from_str(
            r#"{
  "sourceText": "return null;",
  "parameters": [
    {"name": "speed", "kind": "slider", "min": 0, "max": 5, "step": 0.5, "defaultValue": 1},
    {"name": "wire", "kind": "toggle", "defaultValue": false},
    {"name": "reset", "kind": "button"}
  ]
}"#,
        )
        .expect("descriptor should deserialize");

        assert_eq!(descriptor.parameters.len(), 3);
        assert_eq!(descriptor.parameters[0].kind, ParameterKind::Slider);
        assert_eq!(descriptor.parameters[0].step, Some(0.5));
        assert_eq!(
            descriptor.parameters[1].default_value,
            Some(SgValue::Bool(false))
        );
        assert_eq!(descriptor.parameters[2].min, None);
        validate_parameters(&descriptor.parameters).expect("parameters should be valid");
    }

    #[test]
    fn validate_parameters_rejects_inverted_range_bad_step_and_duplicates() {
        let inverted = validate_parameters(&[slider("a", 5.0, 1.0, 1.0)])
            .expect_err("inverted range should fail");
        assert_eq!(inverted.code, "PARAMETER_INVALID");

        let step = validate_parameters(&[slider("a", 0.0, 1.0, 0.0)])
            .expect_err("zero step should fail");
        assert!(step.message.contains("positive step"));

        let duplicate = validate_parameters(&[slider("a", 0.0, 1.0, 0.1), slider("a", 0.0, 2.0, 0.1)])
            .expect_err("duplicate should fail");
        assert!(duplicate.message.contains("Duplicate"));
    }

    #[test]
    fn validation_error_kind_uses_kebab_case_on_the_wire() {
        let error = ValidationError {
            kind: ValidationErrorKind::UndefinedIdentifier,
            identifier_name: Some("foo".to_string()),
            line: 2,
            column: 4,
            message: "'foo' is not defined".to_string(),
        };
        let json = serde_json::to_string(&error).expect("serialize");
        assert!(json.contains("\"kind\":\"undefined-identifier\""));
        assert!(json.contains("\"identifierName\":\"foo\""));
    }

    #[test]
    fn validation_report_omits_empty_warnings() {
        let report = ValidationReport::from_parts(Vec::new(), Vec::new());
        assert!(report.valid);
        let json = serde_json::to_string(&report).expect("serialize");
        assert_eq!(json, r#"{"valid":true,"errors":[]}"#);
    }

    #[test]
    fn generated_module_with_state_copies_everything_else() {
        let module = GeneratedModule {
            version: CodeVersion(3),
            raw_code: "a".to_string(),
            sanitized_code: "b".to_string(),
            parameters: Vec::new(),
            state: ModuleState::Valid,
        };
        let given_up = module.with_state(ModuleState::GivenUp);
        assert_eq!(given_up.version, CodeVersion(3));
        assert_eq!(given_up.sanitized_code, "b");
        assert_eq!(given_up.state, ModuleState::GivenUp);
        assert_eq!(module.state, ModuleState::Valid);
    }

    #[test]
    fn failure_report_builders_attach_context() {
        let report = FailureReport::new(FailureKind::PerFrame, "boom")
            .with_stack(Some("at frame".to_string()))
            .with_static_warnings(vec!["w".to_string()]);
        assert_eq!(report.kind.label(), "per-frame");
        assert_eq!(report.stack.as_deref(), Some("at frame"));
        assert_eq!(report.static_warnings, vec!["w".to_string()]);
    }
}

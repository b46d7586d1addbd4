use serde::Serialize;
use sg_core::{GuardConfig, SanitizeOutput, ValidationReport};

use crate::sanitize::sanitize_source;
use crate::validator::validate_source;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedSource {
    pub validation: ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized: Option<SanitizeOutput>,
}

impl PreparedSource {
    pub fn is_runnable(&self) -> bool {
        self.validation.valid && self.sanitized.is_some()
    }

    /// Validator and sanitizer warnings, in that order.
    pub fn static_warnings(&self) -> Vec<String> {
        let mut warnings = self.validation.warnings.clone();
        if let Some(sanitized) = &self.sanitized {
            warnings.extend(sanitized.warnings.iter().cloned());
        }
        warnings
    }
}

/// Validates the raw unit code and, when it is valid, sanitizes it.
pub fn prepare_source(source: &str, config: &GuardConfig) -> PreparedSource {
    let validation = validate_source(source, config);
    if !validation.valid {
        return PreparedSource {
            validation,
            sanitized: None,
        };
    }
    let sanitized = sanitize_source(source, config);
    PreparedSource {
        validation,
        sanitized: Some(sanitized),
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SceneGuardError;

/// Names the host runtime injects into the scope of every generated unit.
pub const HOST_INJECTED_BINDINGS: &[&str] = &[
    "React",
    "THREE",
    "useState",
    "useEffect",
    "useLayoutEffect",
    "useMemo",
    "useRef",
    "useCallback",
    "useReducer",
    "useContext",
    "useFrame",
    "useThree",
    "params",
    "Canvas",
    "OrbitControls",
    "Text",
    "Html",
    "Line",
    "Sphere",
    "Box",
    "Plane",
    "Grid",
    "Environment",
    "PerspectiveCamera",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardConfig {
    pub extra_host_bindings: Vec<String>,
    pub correction: CorrectionConfig,
    pub runtime: RuntimeConfig,
    pub sanitizer: SanitizerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrectionConfig {
    pub session_max: u32,
    pub per_unit_max: u32,
    pub stack_trace_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub fallback_message_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizerConfig {
    pub hoist_pass_limit: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            extra_host_bindings: Vec::new(),
            correction: CorrectionConfig::default(),
            runtime: RuntimeConfig::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            session_max: 12,
            per_unit_max: 1,
            stack_trace_chars: 1_500,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fallback_message_chars: 120,
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            hoist_pass_limit: 32,
        }
    }
}

impl GuardConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SceneGuardError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| SceneGuardError::new("CONFIG_INVALID", error.to_string()))?;
        if config.sanitizer.hoist_pass_limit == 0 {
            return Err(SceneGuardError::new(
                "CONFIG_INVALID",
                "sanitizer.hoistPassLimit must be at least 1.",
            ));
        }
        Ok(config)
    }

    pub fn host_bindings(&self) -> BTreeSet<String> {
        HOST_INJECTED_BINDINGS
            .iter()
            .map(|name| (*name).to_string())
            .chain(self.extra_host_bindings.iter().cloned())
            .collect()
    }
}

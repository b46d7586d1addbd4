use std::collections::BTreeMap;

use serde::Serialize;
use sg_compiler::{prepare_source, PreparedSource};
use sg_core::{
    validate_parameters, CodeVersion, CorrectionAttempt, CorrectionRequest, CorrectionResponse,
    FailureKind, FailureReport, GeneratedModule, GuardConfig, ModuleState, RetryRequest,
    SceneGuardError, UnitDescriptor, UnitId,
};
use sg_runtime::{ElementFactory, RenderTree};

use crate::budget::CorrectionBudget;
use crate::client::CorrectionClient;
use crate::orchestrator::{CorrectionOrchestrator, CorrectionStep, PendingCorrection};

/// What the presentation layer shows for one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSurface {
    pub unit_id: String,
    pub state: ModuleState,
    pub version: CodeVersion,
    pub sanitized_code: String,
    pub pending_correction: bool,
    pub fallback_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionProgress {
    /// Send this retry to the collaborator and complete again with its answer.
    Retry(RetryRequest),
    Adopted(UnitSurface),
}

#[derive(Debug, Clone)]
struct UnitRecord {
    module: GeneratedModule,
    pending: Option<PendingCorrection>,
    history: Vec<CorrectionAttempt>,
    diagnostic: Option<String>,
    fallback_visible: bool,
}

/// Owns every unit's module, the memoized prepare results and the correction
/// state machine that moves units between versions.
#[derive(Debug)]
pub struct UnitHost {
    orchestrator: CorrectionOrchestrator,
    units: BTreeMap<UnitId, UnitRecord>,
    prepared: BTreeMap<CodeVersion, PreparedSource>,
    next_version: u64,
}

impl UnitHost {
    pub fn new(config: GuardConfig) -> Self {
        let budget = CorrectionBudget::from_config(&config.correction);
        Self::with_budget(config, budget)
    }

    /// Shares an existing session budget with other hosts.
    pub fn with_budget(config: GuardConfig, budget: CorrectionBudget) -> Self {
        Self {
            orchestrator: CorrectionOrchestrator::new(config, budget),
            units: BTreeMap::new(),
            prepared: BTreeMap::new(),
            next_version: 1,
        }
    }

    pub fn budget(&self) -> &CorrectionBudget {
        self.orchestrator.budget()
    }

    pub fn config(&self) -> &GuardConfig {
        self.orchestrator.config()
    }

    /// Adopts generated code for a unit. Reloading identical code keeps the
    /// current version and its memoized prepare result. New code replaces the
    /// previous version's prepare result and discards any correction still in
    /// flight for it.
    pub fn load_unit(
        &mut self,
        unit_id: &UnitId,
        descriptor: UnitDescriptor,
    ) -> Result<UnitSurface, SceneGuardError> {
        validate_parameters(&descriptor.parameters)?;
        if let Some(record) = self.units.get(unit_id) {
            if record.module.raw_code == descriptor.source_text
                && record.module.parameters == descriptor.parameters
            {
                log::debug!("{} reloaded unchanged at {}", unit_id, record.module.version);
                return self.require_surface(unit_id);
            }
        }

        let version = self.allocate_version();
        let prepared = self.prepare(version, &descriptor.source_text);
        let (state, diagnostic, sanitized_code) = match &prepared.sanitized {
            Some(sanitized) if prepared.validation.valid => {
                (ModuleState::Valid, None, sanitized.sanitized_text.clone())
            }
            _ => (
                ModuleState::Unvalidated,
                prepared.validation.first_error_message(),
                String::new(),
            ),
        };
        let module = GeneratedModule {
            version,
            raw_code: descriptor.source_text,
            sanitized_code,
            parameters: descriptor.parameters,
            state,
        };
        log::info!("{} adopted {} ({})", unit_id, version, state);

        let record = self.units.entry(unit_id.clone()).or_insert_with(|| UnitRecord {
            module: module.clone(),
            pending: None,
            history: Vec::new(),
            diagnostic: None,
            fallback_visible: false,
        });
        let previous = record.module.version;
        if previous != version {
            self.prepared.remove(&previous);
        }
        if let Some(pending) = record.pending.take() {
            log::warn!(
                "discarding pending correction for {} captured at {}",
                unit_id,
                pending.version
            );
        }
        record.module = module;
        record.fallback_visible = diagnostic.is_some();
        record.diagnostic = diagnostic;
        self.require_surface(unit_id)
    }

    /// The blocking validation failure of a unit that never became valid.
    pub fn static_failure(&self, unit_id: &UnitId) -> Option<FailureReport> {
        let record = self.units.get(unit_id)?;
        if record.module.state != ModuleState::Unvalidated {
            return None;
        }
        let prepared = self.prepared.get(&record.module.version)?;
        let message = prepared.validation.first_error_message()?;
        Some(
            FailureReport::new(FailureKind::StaticValidation, message)
                .with_static_warnings(prepared.static_warnings()),
        )
    }

    /// Starts a correction round for a contained failure and returns the
    /// request to send. Refuses while a request is in flight and moves the
    /// unit to `GivenUp` when the budget is spent.
    pub fn begin_correction(
        &mut self,
        unit_id: &UnitId,
        failure: FailureReport,
    ) -> Result<CorrectionRequest, SceneGuardError> {
        let static_warnings = self.static_warnings_for(unit_id, &failure);
        let record = self.units.get_mut(unit_id).ok_or_else(|| unit_missing(unit_id))?;
        if record.pending.is_some() {
            return Err(SceneGuardError::new(
                "CORRECTION_PENDING",
                format!("Unit \"{}\" already has a correction in flight.", unit_id),
            ));
        }
        if shows_fallback(failure.kind) {
            record.fallback_visible = true;
        }

        match self
            .orchestrator
            .begin(unit_id, &record.module, &failure, static_warnings)
        {
            Ok(pending) => {
                let request = pending.request.clone();
                record.pending = Some(pending);
                record.module = record.module.with_state(ModuleState::Correcting);
                Ok(request)
            }
            Err(error) => {
                log::warn!("{} gave up: {}", unit_id, error.message);
                record.module = record.module.with_state(ModuleState::GivenUp);
                record.diagnostic = Some(format!("{} Last failure: {}", error.message, failure.message));
                Err(error)
            }
        }
    }

    /// Feeds a collaborator response captured at `version` back into the unit.
    pub fn complete_correction(
        &mut self,
        unit_id: &UnitId,
        version: CodeVersion,
        response: &CorrectionResponse,
    ) -> Result<CorrectionProgress, SceneGuardError> {
        let record = self.units.get_mut(unit_id).ok_or_else(|| unit_missing(unit_id))?;
        let current = record.module.version;
        if version != current {
            log::warn!(
                "discarding stale correction for {} (captured {}, current {})",
                unit_id,
                version,
                current
            );
            return Err(SceneGuardError::new(
                "CORRECTION_STALE",
                format!(
                    "Correction response for {} arrived after the unit moved to {}.",
                    version, current
                ),
            ));
        }
        let Some(mut pending) = record.pending.take() else {
            return Err(SceneGuardError::new(
                "CORRECTION_NOT_PENDING",
                format!("Unit \"{}\" has no correction in flight.", unit_id),
            ));
        };

        match self.orchestrator.complete(&mut pending, response) {
            CorrectionStep::Retry(retry) => {
                record.pending = Some(pending);
                Ok(CorrectionProgress::Retry(retry))
            }
            CorrectionStep::Failed { error, attempt } => {
                record.history.push(attempt);
                record.module = record.module.with_state(ModuleState::GivenUp);
                record.diagnostic = Some(error.message.clone());
                Err(error)
            }
            CorrectionStep::Patched {
                code,
                prepared,
                parameters,
                attempt,
            } => {
                record.history.push(attempt);
                let version = CodeVersion(self.next_version);
                self.next_version += 1;
                let sanitized_code = prepared
                    .sanitized
                    .as_ref()
                    .map(|sanitized| sanitized.sanitized_text.clone())
                    .unwrap_or_default();
                record.module = GeneratedModule {
                    version,
                    raw_code: code,
                    sanitized_code,
                    parameters,
                    state: ModuleState::Valid,
                };
                record.diagnostic = None;
                record.fallback_visible = false;
                self.prepared.remove(&current);
                self.prepared.insert(version, prepared);
                log::info!("{} adopted corrected {}", unit_id, version);
                self.require_surface(unit_id).map(CorrectionProgress::Adopted)
            }
        }
    }

    /// Drops an in-flight correction whose round-trip failed.
    pub fn abandon_correction(&mut self, unit_id: &UnitId, error: &SceneGuardError) {
        if let Some(record) = self.units.get_mut(unit_id) {
            if record.pending.take().is_some() {
                log::warn!("{} correction abandoned: {}", unit_id, error);
                record.module = record.module.with_state(ModuleState::GivenUp);
                record.diagnostic = Some(error.message.clone());
            }
        }
    }

    /// Runs a whole correction round synchronously against `client`.
    pub fn run_correction(
        &mut self,
        unit_id: &UnitId,
        failure: FailureReport,
        client: &dyn CorrectionClient,
    ) -> Result<UnitSurface, SceneGuardError> {
        let request = self.begin_correction(unit_id, failure)?;
        let version = self.require_surface(unit_id)?.version;
        let mut response = client.request_patch(&request);
        loop {
            let answer = match response {
                Ok(answer) => answer,
                Err(error) => {
                    self.abandon_correction(unit_id, &error);
                    return Err(error);
                }
            };
            match self.complete_correction(unit_id, version, &answer)? {
                CorrectionProgress::Adopted(surface) => return Ok(surface),
                CorrectionProgress::Retry(retry) => response = client.request_retry(&retry),
            }
        }
    }

    /// Points a render tree at the unit's current version so contained
    /// failures carry that version's static warnings.
    pub fn attach_render_tree<F: ElementFactory>(
        &self,
        unit_id: &UnitId,
        tree: &mut RenderTree<F>,
    ) -> Result<(), SceneGuardError> {
        let record = self.units.get(unit_id).ok_or_else(|| unit_missing(unit_id))?;
        let warnings = self
            .prepared(unit_id)
            .map(PreparedSource::static_warnings)
            .unwrap_or_default();
        tree.adopt_version(record.module.version, warnings);
        Ok(())
    }

    pub fn surface(&self, unit_id: &UnitId) -> Option<UnitSurface> {
        let record = self.units.get(unit_id)?;
        Some(UnitSurface {
            unit_id: unit_id.as_str().to_string(),
            state: record.module.state,
            version: record.module.version,
            sanitized_code: record.module.sanitized_code.clone(),
            pending_correction: record.pending.is_some(),
            fallback_visible: record.fallback_visible,
            diagnostic: record.diagnostic.clone(),
        })
    }

    pub fn surfaces(&self) -> Vec<UnitSurface> {
        self.units
            .keys()
            .filter_map(|unit_id| self.surface(unit_id))
            .collect()
    }

    pub fn module(&self, unit_id: &UnitId) -> Option<&GeneratedModule> {
        self.units.get(unit_id).map(|record| &record.module)
    }

    pub fn history(&self, unit_id: &UnitId) -> &[CorrectionAttempt] {
        self.units
            .get(unit_id)
            .map(|record| record.history.as_slice())
            .unwrap_or(&[])
    }

    /// Memoized prepare result for the unit's current version.
    pub fn prepared(&self, unit_id: &UnitId) -> Option<&PreparedSource> {
        let version = self.units.get(unit_id)?.module.version;
        let prepared = self.prepared.get(&version);
        if prepared.is_some() {
            log::debug!("prepare cache hit for {} at {}", unit_id, version);
        }
        prepared
    }

    fn allocate_version(&mut self) -> CodeVersion {
        let version = CodeVersion(self.next_version);
        self.next_version += 1;
        version
    }

    fn prepare(&mut self, version: CodeVersion, source: &str) -> PreparedSource {
        let config = self.orchestrator.config();
        self.prepared
            .entry(version)
            .or_insert_with(|| prepare_source(source, config))
            .clone()
    }

    fn static_warnings_for(&self, unit_id: &UnitId, failure: &FailureReport) -> Vec<String> {
        let mut warnings = failure.static_warnings.clone();
        if let Some(prepared) = self.prepared(unit_id) {
            for warning in prepared.static_warnings() {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
        }
        warnings
    }

    fn require_surface(&self, unit_id: &UnitId) -> Result<UnitSurface, SceneGuardError> {
        self.surface(unit_id).ok_or_else(|| unit_missing(unit_id))
    }
}

fn shows_fallback(kind: FailureKind) -> bool {
    matches!(
        kind,
        FailureKind::StaticValidation | FailureKind::RenderPhase | FailureKind::MissingOutput
    )
}

fn unit_missing(unit_id: &UnitId) -> SceneGuardError {
    SceneGuardError::new("UNIT_NOT_FOUND", format!("Unit \"{}\" is not loaded.", unit_id))
}

#[cfg(test)]
mod host_tests {
    use super::*;
    use sg_core::PatchEdit;

    fn host() -> UnitHost {
        UnitHost::new(GuardConfig::default())
    }

    fn response(search: &str, replace: &str) -> CorrectionResponse {
        CorrectionResponse {
            explanation: "patched".to_string(),
            edits: vec![PatchEdit::new(search, replace)],
            parameters: None,
        }
    }

    #[test]
    fn valid_unit_is_sanitized_and_memoized_by_version() {
        let mut host = host();
        let unit = UnitId::new("orbit");
        let source = "const g = React.createElement('mesh', null, new THREE.BoxGeometry(1, 1, 1));";
        let surface = host
            .load_unit(&unit, UnitDescriptor::new(source))
            .expect("unit should load");
        assert_eq!(surface.state, ModuleState::Valid);
        assert!(surface.sanitized_code.contains("React.createElement('boxGeometry'"));
        assert!(!surface.fallback_visible);

        let again = host
            .load_unit(&unit, UnitDescriptor::new(source))
            .expect("unit should reload");
        assert_eq!(again.version, surface.version);
        assert!(host.prepared(&unit).is_some());
        assert!(host.static_failure(&unit).is_none());
    }

    #[test]
    fn invalid_unit_exposes_static_failure() {
        let mut host = host();
        let unit = UnitId::new("broken");
        let surface = host
            .load_unit(&unit, UnitDescriptor::new("const x = y;"))
            .expect("unit should load");
        assert_eq!(surface.state, ModuleState::Unvalidated);
        assert!(surface.fallback_visible);
        assert_eq!(surface.diagnostic.as_deref(), Some("'y' is not defined (line 1)"));
        let failure = host.static_failure(&unit).expect("static failure");
        assert_eq!(failure.kind, FailureKind::StaticValidation);
    }

    #[test]
    fn pending_flag_blocks_second_request_and_stale_responses_are_dropped() {
        let mut host = UnitHost::with_budget(GuardConfig::default(), CorrectionBudget::new(5, 3));
        let unit = UnitId::new("u");
        let first = host
            .load_unit(&unit, UnitDescriptor::new("const a = 1;"))
            .expect("load");
        let failure = FailureReport::new(FailureKind::RenderPhase, "boom");
        host.begin_correction(&unit, failure.clone())
            .expect("first request");
        let error = host
            .begin_correction(&unit, failure)
            .expect_err("second request refused");
        assert_eq!(error.code, "CORRECTION_PENDING");

        host.load_unit(&unit, UnitDescriptor::new("const a = 2;"))
            .expect("new code arrives");
        let error = host
            .complete_correction(&unit, first.version, &response("1", "3"))
            .expect_err("stale response");
        assert_eq!(error.code, "CORRECTION_STALE");
        assert!(!host.surface(&unit).expect("surface").pending_correction);
    }

    #[test]
    fn reloading_new_code_discards_the_pending_correction() {
        let mut host = UnitHost::with_budget(GuardConfig::default(), CorrectionBudget::new(5, 3));
        let unit = UnitId::new("u");
        let first = host
            .load_unit(&unit, UnitDescriptor::new("const a = 1;"))
            .expect("load");
        let failure = FailureReport::new(FailureKind::RenderPhase, "boom");
        host.begin_correction(&unit, failure.clone())
            .expect("first request");

        let second = host
            .load_unit(&unit, UnitDescriptor::new("const a = 2;"))
            .expect("new code arrives");
        assert!(!second.pending_correction);
        assert_eq!(second.state, ModuleState::Valid);

        host.begin_correction(&unit, failure)
            .expect("new version accepts a correction request");
        let error = host
            .complete_correction(&unit, first.version, &response("1", "3"))
            .expect_err("response for the old version");
        assert_eq!(error.code, "CORRECTION_STALE");
        assert!(host.surface(&unit).expect("surface").pending_correction);

        let progress = host
            .complete_correction(&unit, second.version, &response("2", "3"))
            .expect("current response should be adopted");
        assert!(matches!(progress, CorrectionProgress::Adopted(_)));
    }

    #[test]
    fn new_versions_evict_old_prepare_results() {
        let mut host = UnitHost::with_budget(GuardConfig::default(), CorrectionBudget::new(5, 3));
        let unit = UnitId::new("ring");
        let other = UnitId::new("other");
        let first = host
            .load_unit(&unit, UnitDescriptor::new("const a = 1;"))
            .expect("first load");
        let kept = host
            .load_unit(&other, UnitDescriptor::new("const b = 1;"))
            .expect("other unit loads");
        let second = host
            .load_unit(&unit, UnitDescriptor::new("const a = 2;"))
            .expect("second load");
        assert!(!host.prepared.contains_key(&first.version));
        assert!(host.prepared.contains_key(&second.version));
        assert!(host.prepared.contains_key(&kept.version));

        host.begin_correction(&unit, FailureReport::new(FailureKind::RenderPhase, "boom"))
            .expect("request");
        let progress = host
            .complete_correction(&unit, second.version, &response("2", "3"))
            .expect("patch should be adopted");
        let CorrectionProgress::Adopted(third) = progress else {
            panic!("expected the patch to be adopted");
        };
        assert_eq!(
            host.prepared.keys().copied().collect::<Vec<_>>(),
            vec![kept.version, third.version]
        );
        assert!(host.prepared(&unit).is_some());
    }

    #[test]
    fn unknown_units_are_reported() {
        let mut host = host();
        let error = host
            .begin_correction(
                &UnitId::new("ghost"),
                FailureReport::new(FailureKind::RenderPhase, "boom"),
            )
            .expect_err("unknown unit");
        assert_eq!(error.code, "UNIT_NOT_FOUND");
        assert!(host.history(&UnitId::new("ghost")).is_empty());
    }
}

use std::rc::Rc;

use sg_api::{RecordedRequest, ReplayCorrectionClient, UnitHost};
use sg_core::{
    CodeVersion, CorrectionResponse, FailureKind, GuardConfig, ModuleState, PatchEdit,
    UnitDescriptor, UnitId,
};
use sg_runtime::{
    CollectingSink, DeclarativeFactory, Element, Props, RenderError, RenderScope, RenderTree,
};

fn response(explanation: &str, edits: &[(&str, &str)]) -> CorrectionResponse {
    CorrectionResponse {
        explanation: explanation.to_string(),
        edits: edits
            .iter()
            .map(|(search, replace)| PatchEdit::new(*search, *replace))
            .collect(),
        parameters: None,
    }
}

fn mesh(scope: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError> {
    scope.create_element("mesh", Props::new(), Vec::new()).map(Some)
}

fn throwing(_: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError> {
    Err(RenderError::new("Cannot read properties of undefined (reading 'x')")
        .with_stack("at Scene (unit.js:4:3)"))
}

#[test]
fn undefined_identifier_is_corrected_before_first_render() {
    let mut host = UnitHost::new(GuardConfig::default());
    let unit = UnitId::new("pendulum");
    let loaded = host
        .load_unit(
            &unit,
            UnitDescriptor::new(
                "function Scene() {\n  return React.createElement('mesh', { scale: size });\n}",
            ),
        )
        .expect("unit should load");
    assert_eq!(loaded.state, ModuleState::Unvalidated);
    assert!(loaded.fallback_visible);

    let failure = host.static_failure(&unit).expect("validation failure");
    let client = ReplayCorrectionClient::new(vec![response(
        "size comes from params",
        &[("scale: size", "scale: params.size")],
    )]);
    let surface = host
        .run_correction(&unit, failure, &client)
        .expect("correction should succeed");

    assert_eq!(surface.state, ModuleState::Valid);
    assert_eq!(surface.version, CodeVersion(2));
    assert!(!surface.fallback_visible);
    assert!(surface.diagnostic.is_none());
    assert!(surface.sanitized_code.contains("params.size"));

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let RecordedRequest::Patch(request) = &requests[0] else {
        panic!("expected a patch request");
    };
    assert_eq!(
        request.error_message,
        "[static-validation] 'size' is not defined (line 2)"
    );

    let history = host.history(&unit);
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].explanation, "size comes from params");

    let sink = Rc::new(CollectingSink::new());
    let mut tree = RenderTree::new(DeclarativeFactory, sink.clone(), 120);
    host.attach_render_tree(&unit, &mut tree)
        .expect("tree should attach");
    assert_eq!(tree.context().version(), CodeVersion(2));
    assert!(!tree.render(&mesh).is_fallback());
    assert!(sink.is_empty());
}

#[test]
fn runtime_failure_with_unmatched_edits_gives_up_and_keeps_last_good_code() {
    let mut host = UnitHost::new(GuardConfig::default());
    let unit = UnitId::new("orbit");
    let source = "function Scene() {\n  const s = t * 2;\n  const t = 1;\n  return React.createElement('mesh', { scale: s });\n}";
    let loaded = host
        .load_unit(&unit, UnitDescriptor::new(source))
        .expect("unit should load");
    assert_eq!(loaded.state, ModuleState::Valid);

    let sink = Rc::new(CollectingSink::new());
    let mut tree = RenderTree::new(DeclarativeFactory, sink.clone(), 120);
    host.attach_render_tree(&unit, &mut tree)
        .expect("tree should attach");
    assert!(tree.render(&throwing).is_fallback());

    let mut reports = sink.take();
    assert_eq!(reports.len(), 1);
    let failure = reports.remove(0);
    assert_eq!(failure.kind, FailureKind::RenderPhase);
    assert_eq!(
        failure.static_warnings,
        vec!["'t' is used on line 2 before its declaration on line 3".to_string()]
    );

    let client = ReplayCorrectionClient::new(vec![
        response(
            "reorder and guard",
            &[
                ("const s = t * 2;\n  const t = 1;", "const t = 1;\n  const s = t * 2;"),
                ("missingLine();", "guard();"),
            ],
        ),
        response("second try", &[("alsoMissing()", "guard()")]),
    ]);
    let error = host
        .run_correction(&unit, failure.clone(), &client)
        .expect_err("patch should not apply");
    assert_eq!(error.code, "PATCH_APPLY_FAILED");
    assert!(error.message.contains("\"alsoMissing()\""));

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let RecordedRequest::Retry(retry) = &requests[1] else {
        panic!("second request should be the retry");
    };
    assert_eq!(retry.failed_edits, vec![PatchEdit::new("missingLine();", "guard();")]);
    assert!(retry.current_code.contains("const t = 1;\n  const s = t * 2;"));
    assert_eq!(retry.request.stack_trace.as_deref(), Some("at Scene (unit.js:4:3)"));

    let surface = host.surface(&unit).expect("surface");
    assert_eq!(surface.state, ModuleState::GivenUp);
    assert_eq!(surface.version, loaded.version);
    assert_eq!(surface.sanitized_code, loaded.sanitized_code);
    assert!(surface.fallback_visible);
    assert_eq!(surface.diagnostic.as_deref(), Some(error.message.as_str()));
    assert!(!host.history(&unit)[0].success);

    let exhausted = host
        .run_correction(&unit, failure, &client)
        .expect_err("budget should be spent");
    assert_eq!(exhausted.code, "CORRECTION_BUDGET_EXHAUSTED");
    assert_eq!(client.requests().len(), 2);
    assert_eq!(host.budget().snapshot().session_used, 1);
}

#[test]
fn session_budget_is_shared_between_hosts() {
    let mut config = GuardConfig::default();
    config.correction.session_max = 1;
    let first_host = UnitHost::new(config.clone());
    let mut second_host = UnitHost::with_budget(config, first_host.budget().clone());

    let unit = UnitId::new("wave");
    second_host
        .load_unit(&unit, UnitDescriptor::new("const y = x;"))
        .expect("unit should load");
    first_host
        .budget()
        .try_consume(&UnitId::new("other"))
        .expect("first host uses the only attempt");

    let failure = second_host.static_failure(&unit).expect("static failure");
    let client = ReplayCorrectionClient::new(Vec::new());
    let error = second_host
        .run_correction(&unit, failure, &client)
        .expect_err("session budget spent");
    assert_eq!(error.code, "CORRECTION_BUDGET_EXHAUSTED");
    assert!(client.requests().is_empty());
    assert_eq!(
        second_host.surface(&unit).expect("surface").state,
        ModuleState::GivenUp
    );
}

#[test]
fn render_crash_is_patched_and_the_new_version_renders() {
    let mut host = UnitHost::new(GuardConfig::default());
    let unit = UnitId::new("swing");
    let source = "function Scene() {\n  const target = params.target;\n  return React.createElement('mesh', { position: [target.x, 0, 0] });\n}";
    let loaded = host
        .load_unit(&unit, UnitDescriptor::new(source))
        .expect("unit should load");
    assert_eq!(loaded.state, ModuleState::Valid);

    let sink = Rc::new(CollectingSink::new());
    let mut tree = RenderTree::new(DeclarativeFactory, sink.clone(), 120);
    host.attach_render_tree(&unit, &mut tree)
        .expect("tree should attach");
    assert!(tree.render(&throwing).is_fallback());
    let mut reports = sink.take();
    assert_eq!(reports.len(), 1);
    let failure = reports.remove(0);
    assert_eq!(failure.kind, FailureKind::RenderPhase);

    let client = ReplayCorrectionClient::new(vec![response(
        "guard the missing target",
        &[("target.x", "(target ? target.x : 0)")],
    )]);
    let surface = host
        .run_correction(&unit, failure, &client)
        .expect("correction should succeed");
    assert_eq!(surface.state, ModuleState::Valid);
    assert_eq!(surface.version, CodeVersion(2));
    assert!(surface.sanitized_code.contains("(target ? target.x : 0)"));
    assert!(!surface.fallback_visible);
    assert_eq!(client.requests().len(), 1);

    assert!(tree.render(&mesh).is_fallback());
    host.attach_render_tree(&unit, &mut tree)
        .expect("tree should follow the new version");
    assert_eq!(tree.context().version(), CodeVersion(2));
    assert!(!tree.render(&mesh).is_fallback());
    assert!(!tree.fallback_visible());
    assert!(sink.is_empty());
}

#[test]
fn render_crash_is_reported_even_when_the_budget_is_spent() {
    let mut config = GuardConfig::default();
    config.correction.session_max = 1;
    let mut host = UnitHost::new(config);
    let unit = UnitId::new("spin");
    let loaded = host
        .load_unit(
            &unit,
            UnitDescriptor::new("function Scene() {\n  return React.createElement('mesh', null);\n}"),
        )
        .expect("unit should load");
    host.budget()
        .try_consume(&UnitId::new("other"))
        .expect("another unit uses the only attempt");

    let sink = Rc::new(CollectingSink::new());
    let mut tree = RenderTree::new(DeclarativeFactory, sink.clone(), 120);
    host.attach_render_tree(&unit, &mut tree)
        .expect("tree should attach");
    assert!(tree.render(&throwing).is_fallback());
    assert!(!sink.is_empty());
    let mut reports = sink.take();
    assert_eq!(reports.len(), 1);
    let failure = reports.remove(0);
    assert_eq!(failure.kind, FailureKind::RenderPhase);

    let client = ReplayCorrectionClient::new(Vec::new());
    let error = host
        .run_correction(&unit, failure, &client)
        .expect_err("budget should be spent");
    assert_eq!(error.code, "CORRECTION_BUDGET_EXHAUSTED");
    assert!(client.requests().is_empty());

    let surface = host.surface(&unit).expect("surface");
    assert_eq!(surface.state, ModuleState::GivenUp);
    assert_eq!(surface.version, loaded.version);
    assert!(surface.fallback_visible);
    assert!(tree.fallback_visible());
}

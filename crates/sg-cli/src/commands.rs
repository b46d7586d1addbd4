use std::fs;
use std::path::Path;

use sg_api::{ReplayCorrectionClient, UnitHost, UnitSurface};
use sg_compiler::{prepare_source, validate_source};
use sg_core::{FailureKind, FailureReport, SceneGuardError};

use crate::{
    collect_unit_files, load_config, load_unit_file, map_cli_responses_read, resolve_units_dir,
    unit_id_for, write_output, CheckArgs, PatchArgs, SanitizeArgs, ValidateArgs,
};

/// Exit code for a command that ran but found invalid units.
pub(crate) const EXIT_INVALID: i32 = 2;

pub(crate) fn run_validate(args: ValidateArgs) -> Result<i32, SceneGuardError> {
    let config = load_config(args.config.as_deref())?;
    let descriptor = load_unit_file(Path::new(&args.file))?;
    let report = validate_source(&descriptor.source_text, &config);

    println!("RESULT:OK");
    println!("VALID:{}", report.valid);
    println!("REPORT_JSON:{}", to_json(&report));
    for warning in &report.warnings {
        println!("WARNING_JSON:{}", to_json(warning));
    }
    Ok(if report.valid { 0 } else { EXIT_INVALID })
}

pub(crate) fn run_sanitize(args: SanitizeArgs) -> Result<i32, SceneGuardError> {
    let config = load_config(args.config.as_deref())?;
    let descriptor = load_unit_file(Path::new(&args.file))?;
    let prepared = prepare_source(&descriptor.source_text, &config);
    let warnings = prepared.static_warnings();
    let Some(sanitized) = prepared.sanitized else {
        let detail = prepared
            .validation
            .first_error_message()
            .unwrap_or_else(|| "unit is not runnable".to_string());
        return Err(SceneGuardError::new(
            "CLI_UNIT_INVALID",
            format!("Unit failed validation: {}.", detail),
        ));
    };

    if let Some(out) = &args.out {
        write_output(out, &sanitized.sanitized_text)?;
    }
    println!("RESULT:OK");
    for fix in &sanitized.fixes_applied {
        println!("FIX:{}|{}", fix.category, to_json(&fix.description));
    }
    for warning in &warnings {
        println!("WARNING_JSON:{}", to_json(warning));
    }
    match &args.out {
        Some(out) => println!("OUT:{}", out),
        None => println!("CODE_JSON:{}", to_json(&sanitized.sanitized_text)),
    }
    Ok(0)
}

pub(crate) fn run_check(args: CheckArgs) -> Result<i32, SceneGuardError> {
    let config = load_config(args.config.as_deref())?;
    let root = resolve_units_dir(&args.dir)?;
    let files = collect_unit_files(&root)?;

    let mut lines = Vec::with_capacity(files.len());
    let mut invalid = 0usize;
    for file in &files {
        let descriptor = load_unit_file(file)?;
        let prepared = prepare_source(&descriptor.source_text, &config);
        let relative = file
            .strip_prefix(&root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        match &prepared.sanitized {
            Some(sanitized) if prepared.is_runnable() => lines.push(format!(
                "UNIT:{}|OK|fixes={}|warnings={}",
                relative,
                sanitized.fixes_applied.len(),
                prepared.static_warnings().len()
            )),
            _ => {
                invalid += 1;
                let message = prepared
                    .validation
                    .first_error_message()
                    .unwrap_or_default();
                log::warn!("{} is invalid: {}", relative, message);
                lines.push(format!("UNIT:{}|INVALID|{}", relative, to_json(&message)));
            }
        }
    }

    println!("RESULT:OK");
    for line in lines {
        println!("{}", line);
    }
    println!("CHECKED:{}", files.len());
    println!("INVALID:{}", invalid);
    Ok(if invalid == 0 { 0 } else { EXIT_INVALID })
}

pub(crate) fn run_patch(args: PatchArgs) -> Result<i32, SceneGuardError> {
    let config = load_config(args.config.as_deref())?;
    let path = Path::new(&args.file);
    let descriptor = load_unit_file(path)?;
    let unit_id = unit_id_for(path);

    let mut host = UnitHost::new(config);
    let loaded = host.load_unit(&unit_id, descriptor)?;
    let failure = match &args.runtime_error {
        Some(message) => Some(
            FailureReport::new(FailureKind::RenderPhase, message.clone()).with_static_warnings(
                host.prepared(&unit_id)
                    .map(|prepared| prepared.static_warnings())
                    .unwrap_or_default(),
            ),
        ),
        None => host.static_failure(&unit_id),
    };
    let Some(failure) = failure else {
        emit_surface(&loaded, false);
        return Ok(0);
    };

    let raw = fs::read_to_string(&args.responses).map_err(map_cli_responses_read)?;
    let client = ReplayCorrectionClient::from_json_str(&raw)?;
    let surface = host.run_correction(&unit_id, failure, &client)?;

    if let Some(out) = &args.out {
        let code = host
            .module(&unit_id)
            .map(|module| module.raw_code.clone())
            .unwrap_or_default();
        write_output(out, &code)?;
    }
    emit_surface(&surface, true);
    println!("REQUESTS:{}", client.requests().len());
    for attempt in host.history(&unit_id) {
        println!("ATTEMPT_JSON:{}", to_json(attempt));
    }
    Ok(0)
}

fn emit_surface(surface: &UnitSurface, patched: bool) {
    println!("RESULT:OK");
    println!("PATCHED:{}", patched);
    println!("STATE:{}", surface.state);
    println!("VERSION:{}", surface.version);
    println!("SURFACE_JSON:{}", to_json(surface));
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).expect("cli output should serialize")
}

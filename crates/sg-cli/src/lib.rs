use std::ffi::OsString;

use clap::Parser;
use sg_core::SceneGuardError;

mod cli_args;
mod commands;
mod error_map;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, PatchArgs, SanitizeArgs, ValidateArgs};
pub(crate) use error_map::{
    emit_error, map_cli_config_read, map_cli_descriptor_invalid, map_cli_output_write,
    map_cli_responses_read, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
};
pub(crate) use source_loader::{
    collect_unit_files, load_config, load_unit_file, resolve_units_dir, unit_id_for,
    write_output,
};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return error.exit_code(),
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, SceneGuardError> {
    match cli.command {
        Mode::Validate(args) => commands::run_validate(args),
        Mode::Sanitize(args) => commands::run_sanitize(args),
        Mode::Check(args) => commands::run_check(args),
        Mode::Patch(args) => commands::run_patch(args),
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use sg_core::{GuardConfig, SceneGuardError, UnitDescriptor, UnitId};
use walkdir::WalkDir;

use crate::{
    map_cli_config_read, map_cli_descriptor_invalid, map_cli_output_write, map_cli_source_path,
    map_cli_source_read, map_cli_source_scan,
};

const UNIT_EXTENSIONS: [&str; 3] = ["js", "jsx", "mjs"];

/// Reads a unit either as raw generated code or, for `.json` files, as a full
/// descriptor with parameters.
pub(crate) fn load_unit_file(path: &Path) -> Result<UnitDescriptor, SceneGuardError> {
    if !path.is_file() {
        return Err(SceneGuardError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("unit file does not exist: {}", path.display()),
        ));
    }
    let raw = fs::read_to_string(path).map_err(map_cli_source_read)?;
    if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
        return serde_json::from_str(&raw).map_err(map_cli_descriptor_invalid);
    }
    Ok(UnitDescriptor::new(raw))
}

pub(crate) fn load_config(path: Option<&str>) -> Result<GuardConfig, SceneGuardError> {
    let Some(path) = path else {
        return Ok(GuardConfig::default());
    };
    let raw = fs::read_to_string(path).map_err(map_cli_config_read)?;
    GuardConfig::from_json_str(&raw)
}

pub(crate) fn unit_id_for(path: &Path) -> UnitId {
    UnitId::new(
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unit"),
    )
}

pub(crate) fn resolve_units_dir(dir: &str) -> Result<PathBuf, SceneGuardError> {
    let path = PathBuf::from(dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };
    if !absolute.is_dir() {
        return Err(SceneGuardError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("units dir is not a directory: {}", absolute.display()),
        ));
    }
    Ok(absolute)
}

/// Every unit source under `dir`, sorted for stable output.
pub(crate) fn collect_unit_files(dir: &Path) -> Result<Vec<PathBuf>, SceneGuardError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(map_cli_source_scan)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| UNIT_EXTENSIONS.contains(&ext));
        if supported {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        return Err(SceneGuardError::new(
            "CLI_SOURCE_EMPTY",
            format!("No unit sources found under {}", dir.display()),
        ));
    }
    files.sort();
    Ok(files)
}

pub(crate) fn write_output(path: &str, text: &str) -> Result<(), SceneGuardError> {
    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(map_cli_output_write)?;
    }
    fs::write(path, text).map_err(map_cli_output_write)
}

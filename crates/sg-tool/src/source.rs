use std::fs;
use std::path::{Path, PathBuf};

use sg_core::UnitDescriptor;
use walkdir::WalkDir;

use crate::{SgToolError, TestCase, TESTCASE_SCHEMA_V1};

const CASE_FILE: &str = "case.json";

/// Directories under `root` that hold a `case.json`, sorted.
pub fn find_case_dirs(root: &Path) -> Result<Vec<PathBuf>, SgToolError> {
    let mut dirs = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == CASE_FILE)
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect::<Vec<_>>();

    if dirs.is_empty() {
        return Err(SgToolError::CasesEmpty {
            path: root.to_path_buf(),
        });
    }
    dirs.sort();
    Ok(dirs)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, SgToolError> {
    let raw = read_file(case_path)?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| SgToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(SgToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

pub fn read_unit_source(case_dir: &Path, case: &TestCase) -> Result<UnitDescriptor, SgToolError> {
    read_file(&case_dir.join(&case.unit_file)).map(UnitDescriptor::new)
}

pub(crate) fn read_file(path: &Path) -> Result<String, SgToolError> {
    fs::read_to_string(path).map_err(|source| SgToolError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod source_tests {
    use super::*;

    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("sg-tool-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    #[test]
    fn find_case_dirs_collects_sorted_case_directories() {
        let root = temp_dir("find");
        write_file(&root.join("b").join("case.json"), "{}");
        write_file(&root.join("a").join("case.json"), "{}");
        write_file(&root.join("c").join("unit.js"), "const a = 1;");

        let dirs = find_case_dirs(&root).expect("cases should be found");
        assert_eq!(dirs, vec![root.join("a"), root.join("b")]);
    }

    #[test]
    fn find_case_dirs_fails_without_cases() {
        let root = temp_dir("find-empty");
        write_file(&root.join("unit.js"), "const a = 1;");
        let error = find_case_dirs(&root).expect_err("no cases");
        assert!(matches!(error, SgToolError::CasesEmpty { .. }));
    }

    #[test]
    fn read_test_case_checks_schema_and_json() {
        let root = temp_dir("case");
        let path = root.join("case.json");

        write_file(&path, r#"{"schemaVersion": "sg-tool-case.v0", "expectValid": true}"#);
        let error = read_test_case(&path).expect_err("old schema should fail");
        assert!(matches!(error, SgToolError::InvalidSchemaVersion { .. }));

        write_file(&path, "{");
        let error = read_test_case(&path).expect_err("broken json should fail");
        assert!(matches!(error, SgToolError::ParseCase { .. }));

        let error = read_test_case(&root.join("missing.json")).expect_err("missing file");
        assert!(matches!(error, SgToolError::ReadFile { .. }));

        write_file(&path, r#"{"schemaVersion": "sg-tool-case.v1", "expectValid": true}"#);
        let case = read_test_case(&path).expect("case should parse");
        write_file(&root.join("unit.js"), "const a = 1;");
        let descriptor = read_unit_source(&root, &case).expect("unit should load");
        assert_eq!(descriptor.source_text, "const a = 1;");
    }
}

use sg_core::SceneGuardError;
use std::fmt::Display;

fn map_error(code: &'static str, error: impl Display) -> SceneGuardError {
    SceneGuardError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: SceneGuardError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).expect("string json")
    );
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> SceneGuardError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: walkdir::Error) -> SceneGuardError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> SceneGuardError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_descriptor_invalid(error: serde_json::Error) -> SceneGuardError {
    map_error("CLI_DESCRIPTOR_INVALID", error)
}

pub(crate) fn map_cli_config_read(error: std::io::Error) -> SceneGuardError {
    map_error("CLI_CONFIG_READ", error)
}

pub(crate) fn map_cli_responses_read(error: std::io::Error) -> SceneGuardError {
    map_error("CLI_RESPONSES_READ", error)
}

pub(crate) fn map_cli_output_write(error: std::io::Error) -> SceneGuardError {
    map_error("CLI_OUTPUT_WRITE", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(SceneGuardError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_cli_source_path(std::io::Error::other("path")).code,
            "CLI_SOURCE_PATH"
        );
        assert_eq!(
            map_cli_source_read(std::io::Error::other("read")).code,
            "CLI_SOURCE_READ"
        );
        assert_eq!(
            map_cli_config_read(std::io::Error::other("cfg")).code,
            "CLI_CONFIG_READ"
        );
        assert_eq!(
            map_cli_responses_read(std::io::Error::other("resp")).code,
            "CLI_RESPONSES_READ"
        );
        assert_eq!(
            map_cli_output_write(std::io::Error::other("out")).code,
            "CLI_OUTPUT_WRITE"
        );
        let json_error = serde_json::from_str::<serde_json::Value>("{").expect_err("bad json");
        assert_eq!(
            map_cli_descriptor_invalid(json_error).code,
            "CLI_DESCRIPTOR_INVALID"
        );
    }
}

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sg-cli")]
#[command(about = "SceneGuard validation, sanitization and correction replay")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Validate(ValidateArgs),
    Sanitize(SanitizeArgs),
    Check(CheckArgs),
    Patch(PatchArgs),
}

#[derive(Debug, Args, Clone)]
pub(crate) struct ValidateArgs {
    #[arg(long = "file")]
    pub(crate) file: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct SanitizeArgs {
    #[arg(long = "file")]
    pub(crate) file: String,
    #[arg(long = "out")]
    pub(crate) out: Option<String>,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct CheckArgs {
    #[arg(long = "dir")]
    pub(crate) dir: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct PatchArgs {
    #[arg(long = "file")]
    pub(crate) file: String,
    #[arg(long = "responses")]
    pub(crate) responses: String,
    #[arg(long = "out")]
    pub(crate) out: Option<String>,
    /// Treats the unit as valid code that failed while rendering with this message.
    #[arg(long = "runtime-error")]
    pub(crate) runtime_error: Option<String>,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}

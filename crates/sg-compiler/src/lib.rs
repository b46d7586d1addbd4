mod pipeline;
mod sanitize;
mod validator;

pub use pipeline::{prepare_source, PreparedSource};
pub use sanitize::{sanitize_source, RULE_CATEGORIES};
pub use validator::validate_source;

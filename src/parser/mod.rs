pub mod types;
pub mod yaml;

pub use types::{ActionKind, Step, TestScript};
pub use yaml::{parse_script_content, parse_script_file};

use std::path::PathBuf;

use path_slash::PathBufExt;

// For argp::FromArgs
pub fn native_path(value: &str) -> Result<PathBuf, String> { Ok(PathBuf::from_slash(value)) }

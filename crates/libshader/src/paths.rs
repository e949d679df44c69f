use std::env;
use std::path::PathBuf;

use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "LIBSHADER_CONFIG_DIR";
pub const CONFIG_FILE: &str = "pipeline.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "libshader";
const APPLICATION: &str = "libshader";

/// Directory searched for `pipeline.toml` when no `--config` is given.
/// `LIBSHADER_CONFIG_DIR` takes precedence over the platform location.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// The user's `pipeline.toml`, if one exists.
pub fn default_config_file() -> Option<PathBuf> {
    config_dir()
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|path| path.is_file())
}

//! Per-user config and data locations.

use std::path::{Path, PathBuf};

use crate::error::CliError;

const APP_DIR_NAME: &str = "toolbox";
const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_PROFILE: &str = "default";

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

/// Data directory of `profile`, created on demand.
pub fn profile_data_dir(profile: &str) -> Result<PathBuf, CliError> {
    let base = dirs::data_dir()
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))?;
    let dir = profile_dir_in(&base, profile);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn profile_dir_in(base: &Path, profile: &str) -> PathBuf {
    base.join(APP_DIR_NAME).join(profile)
}

/// Trimmed profile name, falling back to the default profile.
pub fn resolve_profile_name(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_PROFILE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_fall_back_to_default() {
        assert_eq!(resolve_profile_name(None), "default");
        assert_eq!(resolve_profile_name(Some("  ")), "default");
        assert_eq!(resolve_profile_name(Some(" work ")), "work");
    }

    #[test]
    fn profiles_get_their_own_directory() {
        let dir = profile_dir_in(Path::new("/data"), "work");
        assert_eq!(dir, PathBuf::from("/data/toolbox/work"));
    }
}

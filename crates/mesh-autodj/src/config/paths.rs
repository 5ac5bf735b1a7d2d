//! Standard locations of Auto DJ files

use std::path::PathBuf;

/// Directory holding the Auto DJ configuration
///
/// Returns: `<config_dir>/mesh-autodj` (e.g. `~/.config/mesh-autodj` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mesh-autodj")
}

/// Default config file path: `<config_dir>/mesh-autodj/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("mesh-autodj/config.yaml"));
    }
}

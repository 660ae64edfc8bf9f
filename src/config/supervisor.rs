//! Supervisor configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::log_buffer::MAX_LOG_CHARACTERS;

/// Name of the helper executable.
pub const HELPER_NAME: &str = "mdns-reflector";

/// Settings for locating and supervising the helper process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Executable name looked up in each resource root.
    pub helper_name: String,

    /// Directories searched in order for the helper (first found wins).
    pub resource_roots: Vec<PathBuf>,

    /// Fall back to `PATH` when no resource root has the helper.
    pub search_path: bool,

    /// Cap on captured output, in characters.
    pub max_log_characters: usize,

    /// Force-kill a child still alive this many seconds after `stop()`.
    pub stop_grace_secs: Option<u64>,

    /// How long output is still drained after the child has exited.
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            helper_name: HELPER_NAME.to_string(),
            resource_roots: default_resource_roots(),
            search_path: true,
            max_log_characters: MAX_LOG_CHARACTERS,
            stop_grace_secs: None,
            drain_timeout_ms: 250,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: SupervisorConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that would make the supervisor misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.helper_name.is_empty() {
            return Err(Error::ConfigError("helper_name must not be empty".to_string()));
        }
        if self.helper_name.contains('/') {
            return Err(Error::ConfigError(format!(
                "helper_name must be a bare file name: {}",
                self.helper_name
            )));
        }
        if self.max_log_characters == 0 {
            return Err(Error::ConfigError(
                "max_log_characters must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Grace period before a stopped child is force-killed, if enabled.
    pub fn stop_grace(&self) -> Option<Duration> {
        self.stop_grace_secs.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Roots next to the running executable: its own directory, then
/// `../libexec/beacon-dns` and `../share/beacon-dns`.
fn default_resource_roots() -> Vec<PathBuf> {
    let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    else {
        return Vec::new();
    };

    let mut roots = vec![exe_dir.clone()];
    if let Some(prefix) = exe_dir.parent() {
        roots.push(prefix.join("libexec").join("beacon-dns"));
        roots.push(prefix.join("share").join("beacon-dns"));
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.helper_name, "mdns-reflector");
        assert_eq!(config.max_log_characters, 20_000);
        assert!(config.search_path);
        assert_eq!(config.stop_grace(), None);
        assert_eq!(config.drain_timeout(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
helper_name: reflector
resource_roots:
  - /opt/beacon/bin
  - /usr/local/libexec
search_path: false
max_log_characters: 4096
stop_grace_secs: 3
"#;

        let config = SupervisorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.helper_name, "reflector");
        assert_eq!(
            config.resource_roots,
            vec![
                PathBuf::from("/opt/beacon/bin"),
                PathBuf::from("/usr/local/libexec")
            ]
        );
        assert!(!config.search_path);
        assert_eq!(config.max_log_characters, 4096);
        assert_eq!(config.stop_grace(), Some(Duration::from_secs(3)));
        assert_eq!(config.drain_timeout_ms, 250);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = SupervisorConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, SupervisorConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = SupervisorConfig::from_yaml_str("helper: x\n");
        assert!(matches!(result, Err(Error::YamlError(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = SupervisorConfig::from_yaml_str("max_log_characters: 0\n");
        assert!(matches!(result, Err(Error::ConfigError(_))));

        let result = SupervisorConfig::from_yaml_str("helper_name: bin/reflector\n");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = SupervisorConfig::from_yaml_file(Path::new("/nonexistent/beacon.yaml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::{NUM_PHYS_PAGES, USER_STACK_SIZE};
use crate::error::{Result, VmError};
use crate::replacement::PolicyKind;

/// Tunables of the simulated machine and pager, read from TOML.
///
/// ```toml
/// num_phys_pages = 32
/// user_stack_size = 1024
/// policy = "lru"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub num_phys_pages: usize,
    pub user_stack_size: usize,
    pub policy: PolicyKind,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            num_phys_pages: NUM_PHYS_PAGES,
            user_stack_size: USER_STACK_SIZE,
            policy: PolicyKind::Fifo,
        }
    }
}

impl VmConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: VmConfig =
            toml::from_str(content).map_err(|e| VmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_phys_pages == 0 {
            return Err(VmError::Config("num_phys_pages must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let config = VmConfig::parse("policy = \"lru\"").unwrap();
        assert_eq!(config.policy, PolicyKind::Lru);
        assert_eq!(config.num_phys_pages, NUM_PHYS_PAGES);
        assert_eq!(config.user_stack_size, USER_STACK_SIZE);
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(VmConfig::parse("").unwrap(), VmConfig::default());
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(matches!(
            VmConfig::parse("frames = 4"),
            Err(VmError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_zero_frames() {
        assert!(matches!(
            VmConfig::parse("num_phys_pages = 0"),
            Err(VmError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm.toml");
        std::fs::write(&path, "num_phys_pages = 8\nuser_stack_size = 256\n").unwrap();

        let config = VmConfig::from_file(&path).unwrap();

        assert_eq!(config.num_phys_pages, 8);
        assert_eq!(config.user_stack_size, 256);
        assert_eq!(config.policy, PolicyKind::Fifo);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            VmConfig::from_file("/nonexistent/vm.toml"),
            Err(VmError::Io(_))
        ));
    }
}

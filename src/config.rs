use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::network::DEFAULT_CAPACITY;

/// Startup settings of one router process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub simulated_ip: String,
    #[serde(default = "default_process_ip")]
    pub process_ip: String,
    /// 0 binds an ephemeral port.
    #[serde(default)]
    pub process_port: u16,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_process_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl RouterConfig {
    pub fn new(simulated_ip: impl Into<String>, process_ip: impl Into<String>, process_port: u16) -> Self {
        Self {
            simulated_ip: simulated_ip.into(),
            process_ip: process_ip.into(),
            process_port,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RouterConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("writing config {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.simulated_ip.is_empty(), "simulated_ip must not be empty");
        anyhow::ensure!(self.capacity > 0, "capacity must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sim-ospf-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: RouterConfig = serde_json::from_str(r#"{"simulated_ip":"192.168.1.1"}"#).unwrap();
        assert_eq!(config.process_ip, "127.0.0.1");
        assert_eq!(config.process_port, 0);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let mut config = RouterConfig::new("10.0.0.2", "127.0.0.1", 5001);
        config.capacity = 2;
        config.save(&path).unwrap();

        let loaded = RouterConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let path = temp_path("zero-capacity");
        fs::write(&path, r#"{"simulated_ip":"10.0.0.3","capacity":0}"#).unwrap();
        assert!(RouterConfig::load(&path).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = RouterConfig::load(temp_path("missing")).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}

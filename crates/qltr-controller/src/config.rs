//! Controller Configuration

use qltr_common::{QltrError, QltrResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Q-learning parameters
    pub learning: LearningConfig,
    /// Trust settings
    pub trust: TrustConfig,
    /// Stats monitor settings
    pub monitor: MonitorConfig,
    /// MAC learning settings
    pub mac_table: MacTableConfig,
    /// Flow installation settings
    pub flow: FlowConfig,
}

impl ControllerConfig {
    /// Load from a JSON file
    pub fn load(path: &str) -> QltrResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate JSON
    pub fn from_json(content: &str) -> QltrResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &str) -> QltrResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> QltrResult<()> {
        self.learning.validate()?;
        self.trust.validate()?;
        self.monitor.validate()?;
        if self.mac_table.max_entries_per_switch == Some(0) {
            return Err(QltrError::Config("mac_table.max_entries_per_switch must be > 0".into()));
        }
        Ok(())
    }
}

/// Q-learning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Learning rate, in (0, 1]
    pub alpha: f64,
    /// Discount factor, in [0, 1]
    pub gamma: f64,
    /// Exploration rate, in [0, 1]
    pub epsilon: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            gamma: 0.9,
            epsilon: 0.3,
        }
    }
}

impl LearningConfig {
    /// Reject out-of-range parameters
    pub fn validate(&self) -> QltrResult<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(QltrError::Config(format!("alpha {} not in (0, 1]", self.alpha)));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(QltrError::Config(format!("gamma {} not in [0, 1]", self.gamma)));
        }
        validate_epsilon(self.epsilon)
    }
}

pub(crate) fn validate_epsilon(epsilon: f64) -> QltrResult<()> {
    if !(0.0..=1.0).contains(&epsilon) {
        return Err(QltrError::Config(format!("epsilon {} not in [0, 1]", epsilon)));
    }
    Ok(())
}

/// Trust settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Switches scoring below this are never picked as exploration hops
    pub min_trust: f64,
}

impl TrustConfig {
    fn validate(&self) -> QltrResult<()> {
        if !(0.0..=1.0).contains(&self.min_trust) {
            return Err(QltrError::Config(format!("min_trust {} not in [0, 1]", self.min_trust)));
        }
        Ok(())
    }
}

/// Stats monitor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between polling rounds
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl MonitorConfig {
    /// Polling interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> QltrResult<()> {
        if self.interval_secs == 0 {
            return Err(QltrError::Config("monitor.interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// MAC learning settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacTableConfig {
    /// Per-switch bound, `None` keeps every MAC forever
    pub max_entries_per_switch: Option<usize>,
}

/// Flow installation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Priority of path rules
    pub priority: u16,
    /// Port answered by the fixed port resolver
    pub default_egress_port: u32,
    /// Install a send-to-controller rule when a switch reports features
    pub install_table_miss: bool,
    /// Resolve host-facing ports from the MAC learning table
    pub learned_ports: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            priority: 1,
            default_egress_port: 1,
            install_table_miss: true,
            learned_ports: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.learning.alpha, 0.5);
        assert_eq!(config.learning.gamma, 0.9);
        assert_eq!(config.learning.epsilon, 0.3);
        assert_eq!(config.monitor.interval(), Duration::from_secs(10));
        assert_eq!(config.flow.priority, 1);
        assert!(config.flow.install_table_miss);
        assert!(!config.flow.learned_ports);
        assert_eq!(config.mac_table.max_entries_per_switch, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ControllerConfig::from_json(r#"{"learning": {"epsilon": 0.0}}"#).unwrap();
        assert_eq!(config.learning.epsilon, 0.0);
        assert_eq!(config.learning.alpha, 0.5);
        assert_eq!(config.monitor.interval_secs, 10);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ControllerConfig::from_json(r#"{"learning": {"alpha": 0.0}}"#).is_err());
        assert!(ControllerConfig::from_json(r#"{"learning": {"gamma": 1.5}}"#).is_err());
        assert!(ControllerConfig::from_json(r#"{"learning": {"epsilon": -0.1}}"#).is_err());
        assert!(ControllerConfig::from_json(r#"{"monitor": {"interval_secs": 0}}"#).is_err());
        assert!(ControllerConfig::from_json(r#"{"trust": {"min_trust": 2.0}}"#).is_err());
        assert!(ControllerConfig::from_json(r#"{"mac_table": {"max_entries_per_switch": 0}}"#).is_err());
        assert!(matches!(
            ControllerConfig::from_json("not json"),
            Err(QltrError::Json(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("qltr-config-{}.json", std::process::id()));
        let path = path.to_string_lossy().into_owned();

        let mut config = ControllerConfig::default();
        config.monitor.interval_secs = 30;
        config.mac_table.max_entries_per_switch = Some(1024);
        config.save(&path).unwrap();

        let loaded = ControllerConfig::load(&path).unwrap();
        assert_eq!(loaded.monitor.interval_secs, 30);
        assert_eq!(loaded.mac_table.max_entries_per_switch, Some(1024));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ControllerConfig::load("/nonexistent/qltr.json"),
            Err(QltrError::Io(_))
        ));
    }
}

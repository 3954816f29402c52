//! Configuration management for topoperf.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{Result, TopoError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Complete configuration for topoperf
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the hardware topology is read from
    pub topology: TopologyConfig,
    /// Counter events and how readings are stored
    pub counters: CounterConfig,
    /// Simulated migration workload
    pub simulation: SimulationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Topology source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Root of the sysfs CPU tree
    pub sysfs_cpu_root: PathBuf,
    /// Root of procfs, used to resolve the CPU a thread runs on
    pub procfs_root: PathBuf,
    /// Path of the meminfo file
    pub meminfo: PathBuf,
}

/// Counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Event names added to the event set
    pub events: Vec<String>,
    /// Keep every reading instead of overwriting temporary ones
    pub permanent: bool,
    /// Consumption mode for intermediate readings
    pub mode: MeasureMode,
}

/// Simulated workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Units visited in order; the route returns to the first unit at the end
    pub units: Vec<u32>,
    /// Work executed on each visit
    pub work_per_step: u64,
    /// Sockets in the synthetic topology
    pub sockets: u32,
    /// Cores per socket in the synthetic topology
    pub cores_per_socket: u32,
    /// Hardware threads per core in the synthetic topology
    pub threads_per_core: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// How intermediate readings are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureMode {
    /// Non-destructive reads of the running totals
    Read,
    /// Destructive reads that reset the hardware counters
    Accumulate,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            sysfs_cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            procfs_root: PathBuf::from("/proc"),
            meminfo: PathBuf::from("/proc/meminfo"),
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig {
            events: vec!["TOT_INS".to_string(), "TOT_CYC".to_string()],
            permanent: false,
            mode: MeasureMode::Read,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            units: vec![0, 1, 2],
            work_per_step: 1_000_000,
            sockets: 1,
            cores_per_socket: 4,
            threads_per_core: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.counters.events.is_empty() {
            return Err(TopoError::config("at least one counter event is required"));
        }

        let mut seen = HashSet::with_capacity(self.counters.events.len());
        for event in &self.counters.events {
            if event.trim().is_empty() {
                return Err(TopoError::config("event names must not be empty"));
            }
            if !seen.insert(event.as_str()) {
                return Err(TopoError::config(format!("duplicate event '{}'", event)));
            }
        }

        let sim = &self.simulation;
        if sim.units.is_empty() {
            return Err(TopoError::config("simulation needs at least one unit"));
        }

        if sim.work_per_step == 0 {
            return Err(TopoError::config("work_per_step must be greater than 0"));
        }

        if sim.sockets == 0 || sim.cores_per_socket == 0 || sim.threads_per_core == 0 {
            return Err(TopoError::config("synthetic topology dimensions must be greater than 0"));
        }

        let threads = sim.total_threads();
        if let Some(unit) = sim.units.iter().find(|&&u| u64::from(u) >= threads) {
            return Err(TopoError::config(format!(
                "unit {} is outside the synthetic topology ({} hardware threads)",
                unit, threads
            )));
        }

        Ok(())
    }
}

impl SimulationConfig {
    /// Number of hardware threads in the synthetic topology
    pub fn total_threads(&self) -> u64 {
        u64::from(self.sockets) * u64::from(self.cores_per_socket) * u64::from(self.threads_per_core)
    }

    /// Units in visiting order, ending back on the first one
    pub fn route(&self) -> Vec<u32> {
        let mut route = self.units.clone();
        if let Some(&first) = self.units.first() {
            if self.units.len() > 1 {
                route.push(first);
            }
        }
        route
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for MeasureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(MeasureMode::Read),
            "accumulate" | "accum" => Ok(MeasureMode::Accumulate),
            _ => Err(format!("Unknown measure mode: {}", s)),
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        let debug = self.config.debug;
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TopoError::config(format!("Failed to parse YAML config: {}", e)))?;
        self.config.debug = debug;
        Ok(self)
    }

    /// Set the counter events
    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.counters.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Store readings permanently
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.config.counters.permanent = permanent;
        self
    }

    /// Set the consumption mode
    pub fn mode(mut self, mode: MeasureMode) -> Self {
        self.config.counters.mode = mode;
        self
    }

    /// Set the simulated unit route
    pub fn units(mut self, units: Vec<u32>) -> Self {
        self.config.simulation.units = units;
        self
    }

    /// Set the work executed per simulated step
    pub fn work_per_step(mut self, work: u64) -> Self {
        self.config.simulation.work_per_step = work;
        self
    }

    /// Set the sysfs CPU root
    pub fn sysfs_cpu_root(mut self, path: PathBuf) -> Self {
        self.config.topology.sysfs_cpu_root = path;
        self
    }

    /// Set the procfs root
    pub fn procfs_root(mut self, path: PathBuf) -> Self {
        self.config.topology.procfs_root = path;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_events_rejected() {
        let result = ConfigBuilder::new().events(["TOT_INS", "TOT_INS"]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unit_outside_topology_rejected() {
        let mut config = Config::default();
        config.simulation.units = vec![0, 8];
        assert!(config.validate().is_err());

        config.simulation.units = vec![0, 7];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_route_returns_to_first_unit() {
        let sim = SimulationConfig::default();
        assert_eq!(sim.route(), vec![0, 1, 2, 0]);

        let single = SimulationConfig {
            units: vec![3],
            ..SimulationConfig::default()
        };
        assert_eq!(single.route(), vec![3]);
    }

    #[test]
    fn test_measure_mode_parsing() {
        assert_eq!("read".parse::<MeasureMode>(), Ok(MeasureMode::Read));
        assert_eq!("Accumulate".parse::<MeasureMode>(), Ok(MeasureMode::Accumulate));
        assert!("stop".parse::<MeasureMode>().is_err());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
counters:
  events: [TOT_INS, L1_DCM]
  permanent: true
  mode: accumulate
simulation:
  units: [1, 3]
  work_per_step: 500
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.counters.events, vec!["TOT_INS", "L1_DCM"]);
        assert!(config.counters.permanent);
        assert_eq!(config.counters.mode, MeasureMode::Accumulate);
        assert_eq!(config.simulation.units, vec![1, 3]);
        assert_eq!(config.simulation.work_per_step, 500);
        assert_eq!(config.simulation.cores_per_socket, 4);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }
}

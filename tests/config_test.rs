//! Configuration system tests.

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use topoperf_lib::core::config::LogLevel;
use topoperf_lib::core::{Config, ConfigBuilder, MeasureMode};

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.counters.events, vec!["TOT_INS", "TOT_CYC"]);
    assert_eq!(config.counters.mode, MeasureMode::Read);
    assert_eq!(config.simulation.units, vec![0, 1, 2]);
    assert_eq!(config.simulation.route(), vec![0, 1, 2, 0]);
    assert_eq!(config.simulation.total_threads(), 8);
    assert_eq!(config.topology.sysfs_cpu_root, PathBuf::from("/sys/devices/system/cpu"));
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .events(["L1_DCM"])
        .mode(MeasureMode::Accumulate)
        .permanent(true)
        .units(vec![3, 5])
        .work_per_step(10)
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.counters.events, vec!["L1_DCM"]);
    assert_eq!(config.counters.mode, MeasureMode::Accumulate);
    assert!(config.counters.permanent);
    assert_eq!(config.simulation.route(), vec![3, 5, 3]);
    assert_eq!(config.simulation.work_per_step, 10);
    assert!(config.debug);
}

#[test]
fn test_yaml_config() {
    let yaml = r#"
counters:
  events: [TOT_INS, BR_MSP]
  mode: accumulate
  permanent: true
simulation:
  units: [7]
  sockets: 2
  cores_per_socket: 2
  threads_per_core: 2
logging:
  level: trace
  structured: true
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert_eq!(config.counters.events, vec!["TOT_INS", "BR_MSP"]);
    assert_eq!(config.counters.mode, MeasureMode::Accumulate);
    assert_eq!(config.simulation.route(), vec![7]);
    assert_eq!(config.simulation.work_per_step, 1_000_000);
    assert_eq!(config.logging.level, LogLevel::Trace);
    assert!(config.logging.structured);
}

#[test]
fn test_config_validation() {
    assert!(Config::default().validate().is_ok());

    // No events
    assert!(ConfigBuilder::new().events(Vec::<String>::new()).build().is_err());

    // Duplicate events
    assert!(ConfigBuilder::new().events(["TOT_INS", "TOT_INS"]).build().is_err());

    // Unit outside the synthetic machine
    assert!(ConfigBuilder::new().units(vec![0, 8]).build().is_err());

    // No work
    assert!(ConfigBuilder::new().work_per_step(0).build().is_err());
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let original = ConfigBuilder::new().units(vec![1, 2]).build().unwrap();
    std::fs::write(&path, serde_yaml::to_string(&original).unwrap()).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let loaded = ConfigBuilder::new().from_yaml(&content).unwrap().build().unwrap();
    assert_eq!(loaded.simulation.units, vec![1, 2]);
    assert_eq!(loaded.counters.events, original.counters.events);
}

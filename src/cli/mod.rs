//! Command-line interface for topoperf.
//!
//! `topoperf topology` prints the hardware topology, `topoperf simulate`
//! drives a measurement session across several CPUs on the simulated
//! counter backend and prints what was attributed to each of them.

use crate::core::config::{ConfigBuilder, MeasureMode};
use crate::core::{Config, Result, TopoError};
use crate::counters::{CounterSource, SimulatedSource};
use crate::metrics::{MeasurementSession, SessionReport};
use crate::topology::{sysfs, AttributeValue, Topology};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

/// Hardware topology with per-thread performance counter accounting
#[derive(Parser, Debug)]
#[command(name = "topoperf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/topoperf/config.yaml)
    #[arg(short, long, env = "TOPOPERF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "TOPOPERF_DEBUG", global = true)]
    pub debug: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the hardware topology
    Topology {
        /// Read the topology of this machine from sysfs instead of the
        /// configured synthetic one
        #[arg(long)]
        sysfs: bool,
    },
    /// Migrate a counting thread across CPUs on the simulated backend
    Simulate {
        /// How intermediate readings are taken (read | accumulate)
        #[arg(long)]
        mode: Option<MeasureMode>,

        /// Keep every reading instead of overwriting temporary ones
        #[arg(long)]
        permanent: bool,

        /// CPUs to visit, in order
        #[arg(long, value_delimiter = ',')]
        units: Option<Vec<u32>>,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("topoperf").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        if let Some(path) = config_path {
            match std::fs::read_to_string(&path) {
                Ok(content) => builder = builder.from_yaml(&content)?,
                Err(e) if self.config.is_some() => {
                    return Err(TopoError::config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                Err(_) => {}
            }
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(Command::Simulate {
            mode,
            permanent,
            units,
        }) = &self.command
        {
            if let Some(mode) = mode {
                builder = builder.mode(*mode);
            }
            if *permanent {
                builder = builder.permanent(true);
            }
            if let Some(units) = units {
                builder = builder.units(units.clone());
            }
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = if self.debug || config.debug {
            "debug"
        } else {
            config.logging.level.as_str()
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_writer(io::stderr)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TopoError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the topoperf command line.
pub fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    cli.init_logging(&config)?;
    tracing::debug!(?config, "configuration loaded");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.check_config {
        writeln!(out, "Configuration is valid!")?;
        writeln!(out, "  Events: {}", config.counters.events.join(", "))?;
        writeln!(out, "  Mode: {:?}", config.counters.mode)?;
        writeln!(out, "  Units: {:?}", config.simulation.units)?;
        writeln!(out, "  Hardware threads: {}", config.simulation.total_threads())?;
        return Ok(());
    }

    match cli.command.clone().unwrap_or(Command::Simulate {
        mode: None,
        permanent: false,
        units: None,
    }) {
        Command::Topology { sysfs } => show_topology(&config, sysfs, cli.json, &mut out),
        Command::Simulate { .. } => {
            let (topology, session) = simulate(&config)?;
            if cli.json {
                writeln!(out, "{}", SessionReport::capture(&session, &topology).to_json()?)?;
            } else {
                session.print_all(&mut out)?;
            }
            session.delete();
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct ComponentRow<'a> {
    id: u32,
    kind: &'static str,
    name: &'a str,
    depth: usize,
    attributes: &'a BTreeMap<String, AttributeValue>,
}

fn show_topology<W: Write>(config: &Config, from_sysfs: bool, json: bool, out: &mut W) -> Result<()> {
    let (topology, root) = if from_sysfs {
        sysfs::load(&config.topology)?
    } else {
        synthetic_topology(config)
    };

    if json {
        let rows: Vec<ComponentRow<'_>> = topology
            .subtree(root)
            .filter_map(|node| {
                let component = topology.get(node)?;
                Some(ComponentRow {
                    id: component.id(),
                    kind: component.kind().as_str(),
                    name: component.name(),
                    depth: topology.depth(node),
                    attributes: component.attributes(),
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        topology.write_tree(root, out)?;
    }
    Ok(())
}

fn synthetic_topology(config: &Config) -> (Topology, crate::topology::NodeId) {
    let sim = &config.simulation;
    Topology::uniform(sim.sockets, sim.cores_per_socket, sim.threads_per_core)
}

/// Run one event set over `config.simulation.route()`: execute
/// `work_per_step` units of work on each CPU, take an intermediate reading,
/// migrate, and stop at the end.
pub fn simulate(config: &Config) -> Result<(Topology, MeasurementSession)> {
    let (topology, root) = synthetic_topology(config);
    let source = SimulatedSource::new().with_procfs_root(config.topology.procfs_root.clone());

    let set = source.create_event_set();
    for event in &config.counters.events {
        source.add_named_event(set, event)?;
    }

    let mut slot = None;
    MeasurementSession::start(&source, set, &mut slot)?;
    let session = slot
        .as_mut()
        .ok_or_else(|| TopoError::invalid_argument("session was not created"))?;

    let permanent = config.counters.permanent;
    for unit in config.simulation.route() {
        source.migrate(set, unit)?;
        source.execute(set, config.simulation.work_per_step)?;
        let ts = match config.counters.mode {
            MeasureMode::Read => session.read(&source, &topology, root, permanent)?,
            MeasureMode::Accumulate => session.accumulate(&source, &topology, root, permanent)?,
        };
        tracing::info!(unit, ts, units = session.units().count(), "reading stored");
    }
    session.stop(&source, &topology, root, permanent)?;
    debug_assert!(source.read(set).is_err());

    let session = slot
        .take()
        .ok_or_else(|| TopoError::invalid_argument("session was not created"))?;
    Ok((topology, session))
}

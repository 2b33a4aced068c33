//! sysmgr-sim
//!
//! Boots the reference board on host threads and drives it through scripted
//! configuration events.

mod scenario;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use cmp_example::{adapt, ExampleTriggers};
use log::{error, info};
use sysmgr::{
    records, ConfigFile, FatalHandler, StandardState, StateSet, SysConfig, SystemManager,
    TraceHook,
};

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host simulation of a sysmgr-managed board")]
struct Args {
    /// TOML overrides for the board configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of cycle hooks to run
    #[arg(long, default_value_t = 20)]
    cycles: u64,

    /// Signal a new configuration at this cycle (repeatable)
    #[arg(long = "new-config-at", value_name = "CYCLE")]
    new_config_at: Vec<u64>,

    /// Request a configuration reset at this cycle (repeatable)
    #[arg(long = "reset-at", value_name = "CYCLE")]
    reset_at: Vec<u64>,

    /// Print every trace record
    #[arg(long)]
    trace: bool,
}

/// Reports the error and terminates the simulation.
struct ExitOnFatal;

impl FatalHandler for ExitOnFatal {
    fn fatal_error(&self, message: &str) -> ! {
        error!("fatal error: {message}");
        process::exit(2);
    }
}

type Transitions = Arc<Mutex<Vec<(StandardState, StandardState)>>>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    info!(
        "booting in {} with a {:?} cycle",
        config.initial_state, config.cycle_period
    );

    let transitions = Transitions::default();
    let manager = SystemManager::builder(config)
        .fatal_handler(ExitOnFatal)
        .trace_hook(trace_hook(Arc::clone(&transitions), args.trace))
        .build()
        .context("system manager initialisation")?;

    let triggers = ExampleTriggers::new();
    let scenario = Scenario::new(
        triggers.clone(),
        args.new_config_at.iter().copied(),
        args.reset_at.iter().copied(),
    );
    let dispatcher = adapt::register_components(manager.dispatcher().register(scenario), &triggers)
        .cycle_limit(args.cycles);

    manager
        .start(dispatcher)
        .context("starting the component manager")?
        .join()
        .context("component manager")?;
    triggers.stop();

    let transitions = transitions
        .lock()
        .map_err(|_| anyhow::anyhow!("transition log poisoned"))?;
    println!("transitions: {}", transitions.len());
    for (old, new) in transitions.iter() {
        println!("  {old} -> {new}");
    }
    println!("final state: {}", manager.state());
    println!(
        "example component configured: {}",
        triggers.is_configured()
    );
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SysConfig<StandardState>> {
    let mut builder = adapt::config_builder();
    if let Some(path) = path {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: ConfigFile =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        builder = file.apply(builder)?;
    }
    Ok(builder.build()?)
}

fn trace_hook(transitions: Transitions, verbose: bool) -> TraceHook {
    Arc::new(move |record: u8, payload: &[u8]| {
        if verbose {
            println!("trace {:<16} {payload:?}", record_name(record));
        }
        let &[old, new] = payload else { return };
        if record != records::TRANSITION_END {
            return;
        }
        let states = (
            StandardState::from_index(usize::from(old)),
            StandardState::from_index(usize::from(new)),
        );
        if let ((Some(old), Some(new)), Ok(mut log)) = (states, transitions.lock()) {
            log.push((old, new));
        }
    })
}

fn record_name(record: u8) -> &'static str {
    match record {
        records::LOCK => "LOCK",
        records::UNLOCK => "UNLOCK",
        records::TRANSITION_BEGIN => "TRANSITION_BEGIN",
        records::CALLBACK => "CALLBACK",
        records::TRANSITION_END => "TRANSITION_END",
        records::HOOK => "HOOK",
        records::CYCLE_OVERRUN => "CYCLE_OVERRUN",
        records::REGISTER => "REGISTER",
        _ => "UNKNOWN",
    }
}

//! Application definition.

extern crate simplelog;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use crate::world::World;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("patchbay-cli")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Build and run keyed resource-exchange worlds from the command line.")
        .arg(
            Arg::with_name("verbosity")
                .long("verbosity")
                .short("v")
                .takes_value(true)
                .default_value("info")
                .value_name("verb")
                .global(true)
                .help("Set the verbosity of the log output"),
        )
        .subcommand(
            SubCommand::with_name("new")
                .display_order(10)
                .about("Create a new commented world file")
                .arg(Arg::with_name("path").required(true).value_name("path")),
        )
        .subcommand(
            SubCommand::with_name("run")
                .display_order(20)
                .about("Run a world file")
                .arg(Arg::with_name("path").required(true).value_name("path"))
                .arg(
                    Arg::with_name("ticks")
                        .long("ticks")
                        .short("t")
                        .takes_value(true)
                        .default_value("100")
                        .help("Number of ticks to run (0 means run until interrupted)"),
                )
                .arg(
                    Arg::with_name("save")
                        .long("save")
                        .takes_value(true)
                        .value_name("dir")
                        .help("Write grid snapshots to the given directory at exit"),
                ),
        )
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

pub fn start(matches: ArgMatches) -> Result<()> {
    setup_log_verbosity(&matches);
    match matches.subcommand() {
        ("new", Some(m)) => start_new(m),
        ("run", Some(m)) => start_run(m),
        _ => Ok(()),
    }
}

fn start_new(matches: &ArgMatches) -> Result<()> {
    let path = resolve_path(matches.value_of("path"))?;
    if path.exists() {
        return Err(anyhow::anyhow!(
            "file already exists: {}",
            path.to_string_lossy()
        ));
    }
    fs::write(&path, crate::world::TEMPLATE)
        .with_context(|| format!("failed writing {}", path.to_string_lossy()))?;
    println!("Created new world file: {}", path.to_string_lossy());
    Ok(())
}

fn start_run(matches: &ArgMatches) -> Result<()> {
    let path = resolve_path(matches.value_of("path"))?;
    let ticks: u64 = matches
        .value_of("ticks")
        .unwrap_or("100")
        .parse()
        .context("--ticks must be an integer")?;

    let mut world = World::from_path(&path)?;
    info!(
        "loaded world: {} endpoints, {} storages",
        world.endpoint_count(),
        world.storage_count()
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed setting interrupt handler")?;

    let mut elapsed = 0u64;
    while (ticks == 0 || elapsed < ticks) && !interrupted.load(Ordering::SeqCst) {
        let (items, fluids, energy) = world.step();
        if items + fluids + energy > 0 {
            info!(
                "tick {}: moved {} items, {} fluid, {} energy",
                world.clock(),
                items,
                fluids,
                energy
            );
        }
        elapsed += 1;
    }

    println!("{}", world.report());

    if let Some(dir) = matches.value_of("save") {
        let dir = PathBuf::from(dir);
        world.save_snapshots(&dir)?;
        println!("Snapshots written to {}", dir.to_string_lossy());
    }
    Ok(())
}

fn resolve_path(value: Option<&str>) -> Result<PathBuf> {
    let mut path = env::current_dir()?;
    if let Some(p_str) = value {
        let p = PathBuf::from(p_str);
        if p.is_relative() {
            path = path.join(p);
        } else {
            path = p;
        }
    }
    Ok(path)
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    let _ = TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed);
}

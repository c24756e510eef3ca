//! sqwatch - run a command whenever watched files change

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use sqwatch_core::config::MAX_PATHS;
use sqwatch_core::{Console, EventClass, Tone, WatchError};
use sqwatch_watcher::{InotifyNotifier, Runtime, WakePipe};
use std::path::PathBuf;
use tracing::Level;

mod cache_dir;
mod console;
mod locks;
mod settings;
mod shutdown;

use cache_dir::CacheSource;
use console::TermConsole;
use locks::CacheLock;
use settings::{FileConfig, Flags, Settings};

/// Watch files and directories, run a command when they change
#[derive(Parser, Debug)]
#[command(name = "sqwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to watch recursively (repeatable)
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// File to watch (repeatable)
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Seconds during which further triggers are only buffered (default: 1)
    #[arg(short = 't', long, value_name = "SECONDS")]
    debounce: Option<u64>,

    /// Event class: all, modify, create, delete, move, attrib
    #[arg(short = 'q', long, value_name = "EVENT")]
    query: Option<String>,

    /// Shell command to run on every trigger
    #[arg(short = 'c', long, value_name = "COMMAND")]
    command: Option<String>,

    /// Diff changed files against cached copies
    #[arg(short = 'D', long)]
    diff: bool,

    /// Append diffs to this file
    #[arg(short = 'l', long = "log", value_name = "FILE")]
    log: Option<PathBuf>,

    /// Print diff lines and debug diagnostics
    #[arg(short = 'v', long)]
    verbose: bool,

    /// TOML file with default settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let events = cli
        .query
        .as_deref()
        .map(str::parse::<EventClass>)
        .transpose()?;
    let settings = Settings::merge(
        file,
        Flags {
            debounce: cli.debounce,
            events,
            command: cli.command.clone(),
            diff: cli.diff,
            log_file: cli.log.clone(),
            verbose: cli.verbose,
        },
    );

    init_tracing(settings.verbose);

    let paths = collect_paths(&cli.dirs, &cli.files)?;
    if paths.is_empty() {
        eprintln!("{}", Cli::command().render_usage());
        bail!("No paths specified");
    }

    let mut console = TermConsole::new();
    let cache = if settings.diff {
        let resolved = cache_dir::from_env();
        if resolved.is_none() {
            tracing::warn!("No cache directory could be resolved, diff mode disabled");
        }
        resolved
    } else {
        None
    };

    announce(&mut console, &settings, cache.as_ref());

    let _lock = match &cache {
        Some((dir, _)) => Some(CacheLock::acquire(dir)?),
        None => None,
    };

    let config = settings.into_config(paths, cache.map(|(dir, _)| dir));
    let wake = WakePipe::new().context("Failed to create wakeup pipe")?;
    let shutdown = shutdown::install(wake.sender().context("Failed to clone wakeup pipe")?)?;
    let notifier = InotifyNotifier::new()?;

    let mut runtime = Runtime::new(config, notifier, console).with_wake(wake);
    runtime.populate();
    runtime.run(shutdown)?;

    Ok(())
}

/// Stderr subscriber, WARN unless verbose
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate `-d` and `-f` arguments, directories first
fn collect_paths(dirs: &[PathBuf], files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if dirs.len() + files.len() > MAX_PATHS {
        bail!("Too many paths specified. Maximum is {}", MAX_PATHS);
    }

    let mut paths = Vec::with_capacity(dirs.len() + files.len());
    for dir in dirs {
        if !dir.is_dir() {
            return Err(WatchError::InvalidPath {
                path: dir.clone(),
                expected: "directory",
            }
            .into());
        }
        paths.push(dir.clone());
    }
    for file in files {
        if !file.is_file() {
            return Err(WatchError::InvalidPath {
                path: file.clone(),
                expected: "file",
            }
            .into());
        }
        paths.push(file.clone());
    }
    Ok(paths)
}

fn announce<C: Console>(
    console: &mut C,
    settings: &Settings,
    cache: Option<&(PathBuf, CacheSource)>,
) {
    if let Some(secs) = settings.debounce {
        console.say(Tone::Muted, format!("+ Debounce set to {}", secs));
    }
    if let Some(class) = settings.events {
        console.say(Tone::Notice, monitoring_notice(class));
    }
    if let Some((dir, source)) = cache {
        console.say(Tone::Muted, "+ Diff mode enabled");
        console.say(
            Tone::Muted,
            format!("+ Cache set. Using {}: {}", source.describe(), dir.display()),
        );
    }
    if let Some(log) = &settings.log_file {
        console.say(Tone::Muted, format!("+ Logging to {}", log.display()));
    }
}

fn monitoring_notice(class: EventClass) -> String {
    let what = match class {
        EventClass::All => "all events",
        EventClass::Modify => "modify event",
        EventClass::Create => "create event",
        EventClass::Delete => "delete event",
        EventClass::Move => "move event",
        EventClass::Attrib => "attribute events",
    };
    format!("+ Monitoring {} enabled", what)
}

//! luna - console host for the Lua module runtime
//!
//! Drives a [`Runtime`] from a fixed-interval tick and routes stdin lines:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `/luna <args>` | admin command (`run`, `stop`, `pause`, `info`, `list`, `help`) |
//! | `/ldo <cmd> <args>` | bound command |
//! | `/zone` | `zoned` hook of every module |
//! | `/quit` | stop every module and exit |
//! | anything else | incoming chat line |
//!
//! # Configuration
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`LUNA_*`)
//! 3. Config script (`<modules_dir>/luna_config.lua`)
//! 4. Default values (lowest priority)

mod console;

use anyhow::Result;
use clap::Parser;
use console::{ConsoleHost, ConsoleInput};
use luna_runtime::{ConfigLoader, LunaConfig, Runtime};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// luna - console host for the Lua module runtime
#[derive(Parser, Debug)]
#[command(name = "luna")]
#[command(version, about, long_about = None)]
struct Args {
    /// Modules root directory (also: LUNA_MODULES_DIR)
    #[arg(short = 'm', long, value_name = "DIR")]
    modules_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 16, env = "LUNA_TICK_MS")]
    tick_ms: u64,

    /// Module to run at startup (repeatable)
    #[arg(long = "run", value_name = "MODULE")]
    run: Vec<String>,
}

/// What the main loop does after a stdin line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn route(runtime: &Runtime, line: &str) -> Flow {
    match ConsoleInput::parse(line) {
        ConsoleInput::Admin(args) => runtime.submit_command(&args),
        ConsoleInput::Bind(args) => runtime.submit_bind_invocation(&args),
        ConsoleInput::Zone => runtime.on_zoned(),
        ConsoleInput::Quit => return Flow::Quit,
        ConsoleInput::Chat(text) => runtime.on_incoming_chat(&text, 0),
        ConsoleInput::Empty => {}
    }
    Flow::Continue
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref dir) = args.modules_dir {
        loader = loader.with_modules_dir(dir);
    }
    // A broken config script must not keep the host from starting.
    let loaded = loader.load();
    let (mut config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => {
            let fallback = loader.clone().skip_config_script().load().unwrap_or_default();
            (fallback, Some(e))
        }
    };
    if args.debug {
        config.debug = true;
    }

    // Filter: --debug / config debug > RUST_LOG env > default "info"
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .init();

    if let Some(e) = config_error {
        warn!(error = %e, "config script failed, using defaults");
    }
    info!(
        modules_dir = %config.modules_dir.display(),
        tick_ms = args.tick_ms,
        "luna v{}",
        env!("CARGO_PKG_VERSION")
    );

    run_console(config, &args).await
}

async fn run_console(config: LunaConfig, args: &Args) -> Result<()> {
    let mut runtime = Runtime::new(config, Rc::new(ConsoleHost));
    for name in &args.run {
        if let Err(e) = runtime.run(name) {
            warn!(module = %name, error = %e, "failed to run module");
        }
    }

    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                runtime.tick();
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if route(&runtime, &line) == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    let stopped = runtime.stop_all();
    info!(stopped, "shutting down");
    Ok(())
}

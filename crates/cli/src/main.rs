//! TEEM command-line front end.
//!
//! Loads a configuration and an assembly program, then hands control to the
//! interactive REPL. The process exit code mirrors the guest's `exit`
//! status.

mod repl;
mod view;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use teem_core::{Config, Cpu};

#[derive(Parser, Debug)]
#[command(
    name = "teem",
    version,
    about = "Transient-execution educational emulator",
    long_about = "Run an assembly program on an out-of-order RV32IM model with \
observable speculation.\n\nExtra arguments are queued as initial REPL commands:\n  \
teem demos/hello-world.asm continue\n  teem demos/spectre-btb.asm \"step 100\" \"show cache\""
)]
struct Cli {
    /// Assembly program to load.
    program: PathBuf,

    /// YAML configuration file. Falls back to ./config.yml, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Commands executed before the first interactive prompt.
    #[arg(trailing_var_arg = true)]
    commands: Vec<String>,
}

fn main() {
    env_logger::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let mut cpu = Cpu::new(&config);

    let source = fs::read_to_string(&cli.program)
        .with_context(|| format!("reading {}", cli.program.display()))?;
    cpu.load_program(&source)
        .with_context(|| format!("loading {}", cli.program.display()))?;

    repl::run(cpu, cli.commands)
}

/// Loads the configuration: the given file, else `./config.yml` when
/// present, else built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let fallback = PathBuf::from("config.yml");
            if !fallback.exists() {
                return Ok(Config::default());
            }
            fallback
        }
    };
    let text =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Config::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
}

//! frameterm - a frame-paced terminal emulator
//!
//! Runs a shell on a pseudo terminal, interprets its output into a screen
//! model and redraws that model at a fixed frame rate inside the terminal
//! frameterm was started from.
//!
//! # Quick Start
//!
//! ```text
//! frameterm                   # Start $SHELL
//! frameterm -s /bin/zsh       # Start a specific shell
//! frameterm --fps 30          # Lower the redraw rate
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Alt+Q | Close frameterm |
//! | Ctrl+Shift+V | Paste clipboard |
//! | Mouse drag | Select and copy |
//! | Mouse wheel | Scroll back |

mod app;
mod config;
mod core;
mod pacer;
mod ui;

use std::env;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::{Config, Theme};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line overrides for the configuration file
#[derive(Debug, Default, PartialEq)]
struct Args {
    config_path: Option<PathBuf>,
    shell: Option<String>,
    theme: Option<String>,
    fps: Option<u32>,
    no_hwaccel: bool,
    no_vsync: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(shell) = self.shell {
            config.shell = Some(shell);
        }
        if let Some(theme) = self.theme {
            config.theme = theme;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if self.no_hwaccel {
            config.hwaccel = false;
        }
        if self.no_vsync {
            config.vsync = false;
        }
    }
}

fn print_version() {
    eprintln!("frameterm {}", VERSION);
}

fn print_help() {
    eprintln!("frameterm {} - A frame-paced terminal emulator", VERSION);
    eprintln!();
    eprintln!("Usage: frameterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Shell to run (default: config, $SHELL, /bin/sh)");
    eprintln!("  -c, --config <PATH>   Configuration file (default: ~/.frameterm/config.toml)");
    eprintln!("      --theme <NAME>    Color theme");
    eprintln!("      --fps <N>         Target frame rate");
    eprintln!("      --no-hwaccel      Repaint the whole screen every frame");
    eprintln!("      --no-vsync        Do not wrap frames in synchronized updates");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Ctrl+Alt+Q            Close frameterm");
    eprintln!("  Ctrl+Shift+V          Paste clipboard");
    eprintln!("  Mouse drag            Select and copy");
    eprintln!("  Mouse wheel           Scroll back");
    eprintln!();
    eprintln!("Themes: {}", Theme::list().join(", "));
    eprintln!();
    eprintln!("Logs: ~/.frameterm/frameterm.log (level from RUST_LOG)");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 1;

    let value = |i: usize, name: &str| -> Result<String, String> {
        args.get(i).cloned().ok_or_else(|| format!("Missing {} argument", name))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-s" | "--shell" => {
                i += 1;
                parsed.shell = Some(value(i, "shell")?);
            }
            "-c" | "--config" => {
                i += 1;
                parsed.config_path = Some(PathBuf::from(value(i, "config")?));
            }
            "--theme" => {
                i += 1;
                parsed.theme = Some(value(i, "theme")?);
            }
            "--fps" => {
                i += 1;
                let fps = value(i, "fps")?;
                parsed.fps = match fps.parse::<u32>() {
                    Ok(n) if n > 0 => Some(n),
                    _ => return Err(format!("Invalid fps: {}", fps)),
                };
            }
            "--no-hwaccel" => parsed.no_hwaccel = true,
            "--no-vsync" => parsed.no_vsync = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Log to `~/.frameterm/frameterm.log`; the host terminal is the display.
fn init_logging() {
    let log_path = config::config_dir()
        .map(|dir| dir.join("frameterm.log"))
        .unwrap_or_else(|| PathBuf::from("frameterm.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("frameterm {} starting...", VERSION);

    let mut config = match args.config_path.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path),
        None => Config::default(),
    };
    args.apply(&mut config);

    let result = App::new(config).run();
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("frameterm exiting");
    result
}

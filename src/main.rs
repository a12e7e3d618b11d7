//! termframe
//!
//! Serve virtual displays to terminal viewers over TCP, or run a single
//! session on the controlling terminal.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use termframe::app::{BackendKind, Config, ConfigError};
use termframe::backend::{DisplayBackend, PatternBackend, X11Backend};
use termframe::core::GridSize;
use termframe::renderer::ColorDepth;
use termframe::session::{MouseMode, SessionManager};
use termframe::transport::{local, tcp, TransportError};

#[derive(Parser, Debug)]
#[command(name = "termframe")]
#[command(version)]
#[command(about = "Stream a virtual display into a truecolor terminal", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Write logs to FILE instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Display backend
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendArg>,

    /// Colour encoding for frames
    #[arg(long, value_enum, global = true)]
    color_depth: Option<ColorArg>,

    /// Frames per second sent to each viewer
    #[arg(long, value_name = "FPS", global = true)]
    fps: Option<u32>,

    /// Mouse mode new sessions start in
    #[arg(long, value_enum, global = true)]
    mouse_mode: Option<MouseArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept viewers on a TCP socket
    Serve {
        /// Listen address, e.g. 0.0.0.0:9867
        #[arg(short, long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Run one session on this terminal
    Local {
        /// Stable viewer identity, e.g. an SSH key fingerprint
        #[arg(long, env = "TERMFRAME_IDENTITY")]
        identity: Option<String>,
    },
    /// Print the effective configuration as JSON
    PrintConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    X11,
    Pattern,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Truecolor,
    Ansi256,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MouseArg {
    Absolute,
    Relative,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Local mode shares the terminal with the rendered frame
    let default_level = match cli.command {
        Command::Local { .. } => "warn",
        _ => "info",
    };
    if let Err(e) = init_tracing(cli.log_file.as_deref(), default_level) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli.command, config));
    // A blocked stdin read must not hold the process open
    runtime.shutdown_timeout(Duration::from_millis(500));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("termframe: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_file: Option<&Path>, default_level: &str) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

/// Config file, then command line overrides
fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::resolve(cli.config.as_deref())?;

    if let Some(backend) = cli.backend {
        config.backend = match backend {
            BackendArg::X11 => BackendKind::X11,
            BackendArg::Pattern => BackendKind::Pattern,
        };
    }
    if let Some(depth) = cli.color_depth {
        config.render.color_depth = match depth {
            ColorArg::Truecolor => ColorDepth::TrueColor,
            ColorArg::Ansi256 => ColorDepth::Ansi256,
        };
    }
    if let Some(fps) = cli.fps {
        if fps == 0 {
            return Err(ConfigError::Invalid("--fps must be positive".to_string()));
        }
        config.render.frame_interval_ms = (1000 / u64::from(fps)).max(1);
    }
    if let Some(mode) = cli.mouse_mode {
        config.input.default_mouse_mode = match mode {
            MouseArg::Absolute => MouseMode::Absolute,
            MouseArg::Relative => MouseMode::Relative,
        };
    }
    if let Command::Serve {
        listen: Some(listen),
    } = &cli.command
    {
        config.listen_address = listen.clone();
    }

    config.validate()?;
    Ok(config)
}

fn backend(config: &Config) -> Arc<dyn DisplayBackend> {
    match config.backend {
        BackendKind::X11 => Arc::new(X11Backend::new(
            config.x11.ffmpeg.as_str(),
            config.x11.xdotool.as_str(),
            config.x11.capture_fps,
        )),
        BackendKind::Pattern => Arc::new(PatternBackend::new()),
    }
}

async fn run(command: Command, config: Config) -> Result<(), AppError> {
    let initial_size = GridSize::new(
        config.terminal.default_columns,
        config.terminal.default_rows,
    );

    match command {
        Command::PrintConfig => {
            let json = serde_json::to_string_pretty(&config).map_err(ConfigError::from)?;
            println!("{}", json);
            Ok(())
        }
        Command::Serve { .. } => {
            let listener = TcpListener::bind(&config.listen_address).await?;
            let manager = SessionManager::new(backend(&config), &config);
            info!(
                backend = ?config.backend,
                displays = config.displays.len(),
                "termframe serving"
            );

            let result = tokio::select! {
                result = tcp::serve(listener, manager.clone(), initial_size) => result,
                _ = shutdown_signal() => {
                    info!("Shutting down");
                    Ok(())
                }
            };
            manager.shutdown().await;
            Ok(result?)
        }
        Command::Local { identity } => {
            let manager = SessionManager::new(backend(&config), &config);
            let result = tokio::select! {
                result = local::run(&manager, identity, initial_size) => result,
                _ = shutdown_signal() => Ok(()),
            };
            manager.shutdown().await;
            Ok(result?)
        }
    }
}

/// Ctrl-C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
}

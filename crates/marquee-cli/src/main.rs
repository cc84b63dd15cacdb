mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::launch::LaunchOptions;
use commands::exit_code_for;
use marquee_core::Orchestrator;
use marquee_schema::MarqueeConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "marquee",
    version,
    about = "Run native and Wine games in isolated container sessions"
)]
struct Cli {
    /// Configuration file (defaults to $MARQUEE_CONFIG, then ~/.config/marquee/marquee.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch a game session from a launch request file.
    Launch {
        /// Path to the launch request TOML file.
        request: PathBuf,
        /// Wait for the session to end and report its exit code and play time.
        #[arg(long, default_value_t = false)]
        wait: bool,
        /// Start an idle container to attach a shell to instead of the game.
        #[arg(long, default_value_t = false)]
        debug: bool,
        /// Print the container that would be created without starting it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Stop a running session.
    Stop {
        /// Session ID.
        session_id: String,
    },
    /// Show a session's recent output.
    Logs {
        /// Session ID.
        session_id: String,
        /// Number of lines from the end.
        #[arg(long, default_value_t = 200)]
        tail: usize,
    },
    /// Show the engine's current view of a session.
    Status {
        /// Session ID.
        session_id: String,
    },
    /// List session containers known to the engine.
    Sessions,
    /// Show the display, audio, and GPU passthrough the next launch would use.
    Display,
    /// Run diagnostic checks on the engine and host.
    Doctor,
    /// Resolve a Windows shortcut, or every shortcut in a Wine prefix.
    Shortcut {
        /// A `.lnk` file or a prefix directory.
        path: PathBuf,
    },
    /// Convert a `REG ADD` batch script into a `.reg` file.
    ConvertReg {
        /// Batch script to convert.
        script: PathBuf,
        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a Wine game's registry setup scripts into its prefix.
    SetupPrefix {
        /// Path to the launch request TOML file.
        request: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn orchestrator(config: Option<&Path>) -> Result<Orchestrator, String> {
    let config = MarqueeConfig::load(config).map_err(|e| format!("config error: {e}"))?;
    Orchestrator::from_config(config).map_err(|e| e.to_string())
}

async fn dispatch(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Launch {
            request,
            wait,
            debug,
            dry_run,
        } => {
            let orchestrator = orchestrator(config)?;
            let options = LaunchOptions {
                wait,
                debug,
                dry_run,
            };
            commands::launch::run(&orchestrator, &request, options, json).await
        }
        Commands::Stop { session_id } => {
            commands::stop::run(&orchestrator(config)?, &session_id).await
        }
        Commands::Logs { session_id, tail } => {
            commands::logs::run(&orchestrator(config)?, &session_id, tail, json).await
        }
        Commands::Status { session_id } => {
            commands::status::run(&orchestrator(config)?, &session_id, json).await
        }
        Commands::Sessions => commands::sessions::run(&orchestrator(config)?, json).await,
        Commands::Display => commands::display::run(&orchestrator(config)?, json),
        Commands::Doctor => commands::doctor::run(&orchestrator(config)?, json).await,
        Commands::Shortcut { path } => commands::shortcut::run(&path, json),
        Commands::ConvertReg { script, output } => {
            commands::convert_reg::run(&script, output.as_deref())
        }
        Commands::SetupPrefix { request } => {
            commands::setup_prefix::run(&orchestrator(config)?, &request, json).await
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MARQUEE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

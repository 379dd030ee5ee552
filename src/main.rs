use clap::{Args, Parser, Subcommand, ValueEnum};
use mqtt_sim::config::{load_plan, validate_plan};
use mqtt_sim::logging::init_file_logging;
use mqtt_sim::mqtt::MqttConnector;
use mqtt_sim::render::{build_sink, OutputMode};
use mqtt_sim::runtime::EngineOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mqtt-sim")]
#[command(about = "Configurable MQTT traffic generator")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the package version
    Version,

    /// Load and validate a config file
    Validate {
        /// Path to the JSON config file
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },

    /// Run the traffic generator
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the JSON config file
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Status output mode
    #[arg(long, value_enum, default_value = "auto")]
    output: OutputChoice,

    /// Seed for deterministic payload generation
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Cancel the whole run on the first stream error
    #[arg(long, conflicts_with = "keep_going")]
    fail_fast: bool,

    /// Keep errored streams ticking (default)
    #[arg(long)]
    keep_going: bool,

    /// Verbose output: payload previews in log mode, debug-level file log
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputChoice {
    Auto,
    Table,
    Log,
}

impl From<OutputChoice> for OutputMode {
    fn from(choice: OutputChoice) -> Self {
        match choice {
            OutputChoice::Auto => OutputMode::Auto,
            OutputChoice::Table => OutputMode::Table,
            OutputChoice::Log => OutputMode::Log,
        }
    }
}

const EXIT_INVALID_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::Validate { config } => match validate_plan(&config) {
            Ok(summary) => {
                println!("{}", summary.render());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{err}");
                ExitCode::from(EXIT_INVALID_CONFIG)
            }
        },
        Commands::Run(args) => run_command(args).await,
    }
}

async fn run_command(args: RunArgs) -> ExitCode {
    let log_path = match init_file_logging(args.verbose, None) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(log_path = %log_path.display(), "logging configured");

    let plan = match load_plan(&args.config) {
        Ok(plan) => plan,
        Err(err) => {
            tracing::error!(error = %err, "config rejected");
            eprintln!("{err}");
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let is_tty = std::io::stdout().is_terminal();
    let sink = build_sink(args.output.into(), is_tty, args.verbose);
    // keep-going is the default; --fail-fast and --keep-going conflict
    let fail_fast = args.fail_fast && !args.keep_going;
    let opts = EngineOptions {
        fail_fast,
        duration: args.duration,
        seed: args.seed,
        ..EngineOptions::default()
    };

    match mqtt_sim::runtime::run(plan, opts, sink, &MqttConnector, cancel).await {
        Ok(result) => ExitCode::from(result.exit_code.clamp(0, u8::MAX as i32) as u8),
        Err(err) => {
            tracing::error!(error = %err, "run setup failed");
            eprintln!("{err}");
            ExitCode::from(EXIT_INVALID_CONFIG)
        }
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use pasarela::config::Config;
use pasarela::{ConnectionMode, Pasarela};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pasarela")]
#[command(about = "Connect to a Cassandra cluster directly or through a Kubernetes ingress")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Connection mode: direct, ingress, sni-ingress or mtls-sni-ingress
    mode: Option<String>,

    /// Path to configuration file (default: config/<mode>.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Build and print the session plan without connecting
    #[arg(long)]
    check: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example configuration file for a mode
    Config {
        /// Connection mode
        #[arg(short, long)]
        mode: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Commands::Config { mode, output }) = cli.command {
        return report(generate_config(&mode, output));
    }

    let Some(mode) = cli.mode else {
        eprintln!("Missing connection type argument. {}", ConnectionMode::usage());
        return ExitCode::FAILURE;
    };

    if let Err(e) = mode.parse::<ConnectionMode>() {
        eprintln!("{e}");
        eprintln!("Invalid connection type. {}", ConnectionMode::usage());
        return ExitCode::FAILURE;
    }

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(format!("config/{mode}.toml")));

    if cli.check {
        return report(check(&mode, config_path));
    }

    report(run(&mode, config_path).await)
}

fn report(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load(config_path: &Path) -> anyhow::Result<Config> {
    let config = Config::load_from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!("Configuration loaded from: {:?}", config_path);
    Ok(config)
}

async fn run(mode: &str, config_path: PathBuf) -> anyhow::Result<()> {
    let config = load(&config_path)?;
    info!("Starting pasarela v{} in {} mode", env!("CARGO_PKG_VERSION"), mode);

    let pasarela = Pasarela::new(config);
    let mut stdout = std::io::stdout().lock();
    pasarela
        .run(mode, &mut stdout)
        .await
        .with_context(|| format!("{mode} session failed"))
}

fn check(mode: &str, config_path: PathBuf) -> anyhow::Result<()> {
    let config = load(&config_path)?;
    let plan = Pasarela::new(config)
        .plan(mode)
        .with_context(|| format!("{mode} bootstrap failed"))?;

    println!("✓ Session plan for {:?}", config_path);
    print!("{plan}");
    Ok(())
}

fn generate_config(mode: &str, output: PathBuf) -> anyhow::Result<()> {
    println!("Generating {} configuration file: {:?}", mode, output);

    Config::create_example_config(&output, mode).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  pasarela {} --config {:?}", mode, output);
    Ok(())
}

fn init_logging(config: &Config) {
    let log_level = match config.logging.level.as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    let _ = env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .try_init();

    info!("Logging initialized at level: {:?}", log_level);
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kstep_core::{DeviceType, SessionConfig};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the kstep workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build,
    /// Run all tests
    Test,
    /// Run clippy with warnings denied
    Lint,
    /// Write a default session config, or check an existing one
    Config {
        /// Config file path
        path: PathBuf,
        /// Validate the file instead of writing it
        #[arg(long)]
        check: bool,
        #[arg(long, value_enum, default_value_t = Device::Standard)]
        device: Device,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Device {
    Standard,
    Slim,
}

impl From<Device> for DeviceType {
    fn from(d: Device) -> Self {
        match d {
            Device::Standard => DeviceType::Standard,
            Device::Slim => DeviceType::Slim,
        }
    }
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    println!("{}...", what);
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => cargo(&["build", "--workspace"], "Building workspace")?,
        Commands::Test => cargo(&["test", "--workspace"], "Running tests")?,
        Commands::Lint => cargo(
            &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            "Linting",
        )?,
        Commands::Config {
            path,
            check,
            device,
        } => {
            if *check {
                let config = SessionConfig::load_from_file(path)
                    .with_context(|| format!("invalid config {}", path.display()))?;
                println!(
                    "{}: ok ({} device, operation timeout {} ms)",
                    path.display(),
                    config.device_type,
                    config.operation_timeout_ms
                );
            } else {
                SessionConfig::for_device((*device).into()).save_to_file(path)?;
                println!("Wrote {}", path.display());
            }
        }
    }

    Ok(())
}

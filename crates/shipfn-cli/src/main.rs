use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use shipfn_core::{ConfigError, ErrorKind};
use shipfn_rollout::PublishError;

mod commands;
mod output;

use commands::Overrides;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "shipfn",
    about = "shipfn: incremental deploys for serverless functions",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log format on stderr.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish whatever changed since the last deployment and move the alias.
    ///
    /// Several config files deploy several functions concurrently; each is
    /// reported on its own.
    Deploy {
        /// Function config files.
        #[arg(short, long = "config", default_value = "shipfn.toml", num_args = 1..)]
        configs: Vec<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Show what a deployment would publish, without changing anything.
    Plan {
        #[arg(short, long, default_value = "shipfn.toml")]
        config: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Show the last deployment record and the alias target.
    Status {
        #[arg(short, long, default_value = "shipfn.toml")]
        config: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Write a shipfn.toml scaffold.
    Init {
        /// Project directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Function name.
        #[arg(long)]
        name: String,
        #[arg(long, default_value = shipfn_core::config::DEFAULT_RUNTIME)]
        runtime: String,
        /// Overwrite an existing shipfn.toml.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,shipfn=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Deploy {
            configs,
            overrides,
            output,
        } => commands::deploy::deploy(&configs, &overrides, output).await,
        Commands::Plan {
            config,
            overrides,
            output,
        } => commands::plan::plan(&config, &overrides, output),
        Commands::Status {
            config,
            overrides,
            output,
        } => commands::status::status(&config, &overrides, output),
        Commands::Init {
            path,
            name,
            runtime,
            force,
        } => commands::init::init(&path, &name, &runtime, force),
    }
}

/// Exit status for a fatal error, derived from its kind when it has one.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = if let Some(e) = err.downcast_ref::<PublishError>() {
        e.kind
    } else if err.downcast_ref::<ConfigError>().is_some() {
        ErrorKind::InvalidInput
    } else {
        return 1;
    };
    kind.exit_code().clamp(1, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfn_rollout::{Cause, Phase};

    #[test]
    fn exit_code_follows_error_kind() {
        let partial = anyhow::Error::new(PublishError::new(
            Phase::ShiftAlias,
            Cause::AliasNotShifted {
                version: "4".into(),
                alias: "latest".into(),
                source: shipfn_platform::PlatformError::Unavailable("timeout".into()),
            },
        ));
        assert_eq!(exit_code(&partial), 3);

        let config = anyhow::Error::new(ConfigError::Missing("function.name"));
        assert_eq!(exit_code(&config), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn deploy_accepts_several_configs() {
        let cli = Cli::try_parse_from([
            "shipfn", "deploy", "-c", "a/shipfn.toml", "b/shipfn.toml", "--alias", "live",
        ])
        .unwrap();
        let Commands::Deploy {
            configs, overrides, ..
        } = cli.command
        else {
            panic!("expected deploy");
        };
        assert_eq!(configs.len(), 2);
        assert_eq!(overrides.alias.as_deref(), Some("live"));
    }
}

use anyhow::Result;
use clap::{CommandFactory, Parser};

use vbox_sweeper::cli::{Cli, Command};
use vbox_sweeper::config::Config;
use vbox_sweeper::service::Service;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbose, cli.quiet);

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    tracing::debug!(?config, "Loaded configuration");

    // Dispatch to subcommand
    match cli.command {
        Command::Run(args) => {
            tracing::info!(?args, "Starting service");
            let mut config = config;
            if let Some(secs) = args.start_delay {
                config.walker.start_delay_secs = secs;
            }
            if let Some(secs) = args.interval {
                config.walker.scan_interval_secs = secs;
            }
            Service::new(config).run()?;
        }
        Command::Sweep(args) => {
            tracing::info!(?args, "Starting sweep");
            Service::new(config).sweep(!args.no_root_logs)?;
        }
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if quiet {
        "warn"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vbox_sweeper={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

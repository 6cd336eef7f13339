use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// vbox-sweeper - A Linux cleanup service for leftover VirtualBox artifacts
#[derive(Parser, Debug)]
#[command(name = "vbox-sweeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the cleanup service until SIGTERM/SIGINT
    Run(RunArgs),

    /// Perform a single cleanup pass and exit
    Sweep(SweepArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds before the first drive scan
    #[arg(long, value_name = "SECS")]
    pub start_delay: Option<u64>,

    /// Seconds between drive scans
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Skip the root configuration log cleanup
    #[arg(long)]
    pub no_root_logs: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Validates the CLI definition is correct
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_command() {
        let cli = Cli::parse_from(["vbox-sweeper", "run", "--interval", "60"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.interval, Some(60));
                assert_eq!(args.start_delay, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn parse_sweep_with_config() {
        let cli = Cli::parse_from(["vbox-sweeper", "sweep", "--config", "/etc/vbox-sweeper.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vbox-sweeper.toml")));
        match cli.command {
            Command::Sweep(args) => assert!(!args.no_root_logs),
            _ => panic!("Expected Sweep command"),
        }
    }

    #[test]
    fn global_verbose_flag() {
        let cli = Cli::parse_from(["vbox-sweeper", "-vvv", "sweep"]);
        assert_eq!(cli.verbose, 3);
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "echo-sim",
    about = "Simulate peers replicating an ECHO party in memory",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Model {
    /// ADD/MULTIPLY counter; order sensitive across feeds
    Accumulator,
    /// Shared objects in a space with admission
    Objects,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write from several peers, replicate, and compare final states
    Simulate(SimulateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Number of peers
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub peers: u16,
    /// Messages written by each peer
    #[arg(long, default_value_t = 10)]
    pub messages: u32,
    #[arg(long, value_enum, default_value = "accumulator")]
    pub model: Model,
    /// Replicate between peers after this many writing rounds
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub sync_every: u32,
    /// Pipeline configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["echo-sim", "simulate"]).unwrap();
        let Command::Simulate(args) = cli.command;
        assert_eq!(args.peers, 3);
        assert_eq!(args.messages, 10);
        assert_eq!(args.model, Model::Accumulator);
        assert!(args.config.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn parse_simulate_objects() {
        let cli = Cli::try_parse_from([
            "echo-sim",
            "simulate",
            "--peers",
            "5",
            "--messages",
            "2",
            "--model",
            "objects",
            "--config",
            "echo.toml",
            "--format",
            "json",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command;
        assert_eq!(args.peers, 5);
        assert_eq!(args.model, Model::Objects);
        assert_eq!(args.config, Some(PathBuf::from("echo.toml")));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn zero_peers_rejected() {
        assert!(Cli::try_parse_from(["echo-sim", "simulate", "--peers", "0"]).is_err());
    }

    #[test]
    fn unknown_model_rejected() {
        assert!(Cli::try_parse_from(["echo-sim", "simulate", "--model", "graph"]).is_err());
    }
}

use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use echo_pipeline::PipelineConfig;

use crate::cli::*;
use crate::simulation::{simulate, Plan, SimulationReport};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Simulate(args) => cmd_simulate(args, cli.format).await,
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PipelineConfig::from_toml_str(&text)
                .with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

async fn cmd_simulate(args: SimulateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let plan = Plan {
        peers: usize::from(args.peers),
        messages: args.messages,
        sync_every: args.sync_every,
        config,
    };
    let report = simulate(args.model, &plan).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report, &plan),
    }
    Ok(())
}

fn print_report(report: &SimulationReport, plan: &Plan) {
    println!(
        "Simulated {} peers, {} messages ({} model, {:?} order, {:?} codec)",
        report.peers.len().to_string().bold(),
        report.messages.to_string().bold(),
        report.model.cyan(),
        plan.config.selector,
        plan.config.codec,
    );
    for peer in &report.peers {
        println!(
            "  peer {} {}  {}  digest {}  ({} processed, {} skipped)",
            peer.peer,
            peer.feed.yellow(),
            peer.summary,
            peer.digest.dimmed(),
            peer.processed,
            peer.skipped,
        );
    }
    if report.converged {
        println!("{} All peers converged.", "✓".green().bold());
    } else {
        println!("{} Peers diverged.", "✗".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use echo_pipeline::{Codec, SelectorKind};

    #[test]
    fn load_config_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "codec = \"bincode\"\nselector = \"feed_key\"\npoll_interval_ms = 20").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.codec, Codec::Bincode);
        assert_eq!(config.selector, SelectorKind::FeedKey);
        assert_eq!(config.poll_interval_ms, Some(20));
    }

    #[test]
    fn load_config_defaults_without_path() {
        assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = 5000").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[tokio::test]
    async fn simulate_command_runs() {
        let args = SimulateArgs {
            peers: 2,
            messages: 3,
            model: Model::Objects,
            sync_every: 1,
            config: None,
        };
        cmd_simulate(args, OutputFormat::Json).await.unwrap();
    }
}

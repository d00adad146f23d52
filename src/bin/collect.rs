use anyhow::{anyhow, Context, Result};
use clap::Parser;
use masters_advisor::config::{CollectArgs, DataArgs, LogArgs};
use masters_advisor::snapshot::write_snapshot;
use masters_advisor::{telemetry, Collector};

#[derive(Parser, Debug)]
#[command(
    name = "advisor-collect",
    about = "Scrape both master's program pages into local snapshots"
)]
struct CollectCli {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    collect: CollectArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CollectCli::parse();
    telemetry::init(cli.log.log_json).map_err(|err| anyhow!("failed to install logger: {err}"))?;

    let targets = cli.collect.targets().context("invalid --base-url")?;
    let collector = Collector::new(cli.collect.collector_config())
        .context("failed to build collector HTTP client")?;
    let snapshots = collector
        .collect_all(&targets)
        .await
        .context("scrape failed")?;

    for snapshot in &snapshots {
        let path = write_snapshot(&cli.data.data_dir, snapshot)
            .with_context(|| format!("failed to write snapshot for {}", snapshot.program.slug()))?;
        println!(
            "{}: {} courses, {} chunks -> {}",
            snapshot.program.display_name(),
            snapshot.profile.courses.len(),
            snapshot.curriculum_chunks().len(),
            path.display()
        );
    }
    Ok(())
}

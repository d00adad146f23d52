use anyhow::{anyhow, Context, Result};
use clap::Parser;
use masters_advisor::config::{DataArgs, EmbedArgs, LogArgs, OpenAiArgs, StoreArgs};
use masters_advisor::snapshot::read_all_snapshots;
use masters_advisor::{build_index, telemetry};

#[derive(Parser, Debug)]
#[command(
    name = "advisor-index",
    about = "Embed collected program snapshots and replace the vector store"
)]
struct IndexCli {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    openai: OpenAiArgs,

    #[command(flatten)]
    embed: EmbedArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IndexCli::parse();
    telemetry::init(cli.log.log_json).map_err(|err| anyhow!("failed to install logger: {err}"))?;

    let snapshots = read_all_snapshots(&cli.data.data_dir)
        .with_context(|| {
            format!(
                "failed to read snapshots from {}",
                cli.data.data_dir.display()
            )
        })?;
    let embedder = cli
        .embed
        .embedder(&cli.openai)
        .context("failed to build embedder")?;
    let store = cli
        .store
        .open()
        .await
        .context("failed to open vector store")?;

    let report = build_index(&snapshots, &embedder, store.as_ref())
        .await
        .context("indexing failed")?;
    println!(
        "indexed {} records from {} programs ({} dimensions)",
        report.records, report.programs, report.dimensions
    );
    Ok(())
}

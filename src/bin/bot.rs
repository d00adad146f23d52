use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use masters_advisor::config::{
    AnswerArgs, ChatArgs, CollectArgs, DataArgs, EmbedArgs, LogArgs, OpenAiArgs, StoreArgs,
    TelegramArgs,
};
use masters_advisor::snapshot::{read_all_snapshots, write_snapshot};
use masters_advisor::{
    build_index, telemetry, Answerer, Bot, Collector, Embedder, Recommender, VectorStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "advisor-bot",
    about = "Telegram bot answering questions about the AI and AI Product master's programs"
)]
struct BotCli {
    /// Scrape and re-index both programs before starting the bot
    #[arg(long, env = "ADVISOR_REFRESH", default_value_t = false)]
    refresh: bool,

    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    collect: CollectArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    openai: OpenAiArgs,

    #[command(flatten)]
    embed: EmbedArgs,

    #[command(flatten)]
    chat: ChatArgs,

    #[command(flatten)]
    answer: AnswerArgs,

    #[command(flatten)]
    telegram: TelegramArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BotCli::parse();
    telemetry::init(cli.log.log_json).map_err(|err| anyhow!("failed to install logger: {err}"))?;

    let embedder: Arc<dyn Embedder> = Arc::new(
        cli.embed
            .embedder(&cli.openai)
            .context("failed to build embedder")?,
    );
    let store = cli
        .store
        .open()
        .await
        .context("failed to open vector store")?;
    if cli.refresh {
        refresh(
            &cli.collect,
            &cli.data.data_dir,
            embedder.as_ref(),
            store.as_ref(),
        )
        .await?;
    }

    match store.len().await {
        Ok(0) => tracing::warn!("vector store is empty; run advisor-index or pass --refresh"),
        Ok(records) => tracing::info!(records, "vector store ready"),
        Err(err) => tracing::warn!(error = %err, "could not count vector store records"),
    }

    let recommender = match read_all_snapshots(&cli.data.data_dir) {
        Ok(snapshots) => Recommender::from_snapshots(&snapshots),
        Err(err) => {
            tracing::warn!(
                error = %err,
                "snapshots unavailable; recommendations fall back to retrieval"
            );
            Recommender::new(Vec::new())
        }
    };
    let llm = cli
        .chat
        .provider(&cli.openai)
        .context("failed to build chat provider")?;
    let answerer = Answerer::new(
        embedder,
        store,
        llm,
        recommender,
        cli.answer.answerer_config(),
    );

    let client = cli
        .telegram
        .client()
        .context("failed to build Telegram client")?;
    let bot = Arc::new(Bot::new(Arc::new(answerer)));
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("ctrl-c received");
    };
    bot.run(client, cli.telegram.poll_config(), shutdown)
        .await
        .context("telegram polling stopped")?;
    Ok(())
}

async fn refresh(
    collect: &CollectArgs,
    data_dir: &Path,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> Result<()> {
    let targets = collect.targets().context("invalid --base-url")?;
    let collector = Collector::new(collect.collector_config())
        .context("failed to build collector HTTP client")?;
    let snapshots = collector
        .collect_all(&targets)
        .await
        .context("scrape failed")?;
    for snapshot in &snapshots {
        write_snapshot(data_dir, snapshot)
            .with_context(|| format!("failed to write snapshot for {}", snapshot.program.slug()))?;
    }
    let report = build_index(&snapshots, embedder, store)
        .await
        .context("indexing failed")?;
    tracing::info!(records = report.records, "refresh complete");
    Ok(())
}

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use masters_advisor::answerer::render_context;
use masters_advisor::config::{
    AnswerArgs, ChatArgs, DataArgs, EmbedArgs, LogArgs, OpenAiArgs, StoreArgs,
};
use masters_advisor::snapshot::read_all_snapshots;
use masters_advisor::{
    telemetry, Answerer, Disposition, Embedder, ProgramId, Recommender, UserBackground, UserQuery,
    VectorStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "advisor-ask",
    about = "Ask the program advisor a single question from the terminal"
)]
struct AskCli {
    /// Question about the programs
    question: Option<String>,

    /// Compare the two programs instead of answering a question
    #[arg(long, conflicts_with_all = ["question", "admission"])]
    compare: bool,

    /// Print admission requirements instead of answering a question
    #[arg(long, conflicts_with = "question")]
    admission: bool,

    /// Restrict admission info to one program (ai or ai_product)
    #[arg(long)]
    program: Option<ProgramId>,

    /// Background passed along with the question
    #[arg(long)]
    background: Option<String>,

    /// Only print the retrieved context (skip the LLM calls)
    #[arg(long, default_value_t = false)]
    dry_run: bool,

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

    #[command(flatten)]
    chat: ChatArgs,

    #[command(flatten)]
    answer: AnswerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AskCli::parse();
    telemetry::init(cli.log.log_json).map_err(|err| anyhow!("failed to install logger: {err}"))?;

    let embedder = cli
        .embed
        .embedder(&cli.openai)
        .context("failed to build embedder")?;
    let store = cli
        .store
        .open()
        .await
        .context("failed to open vector store")?;

    if cli.dry_run {
        let Some(question) = cli.question.as_deref() else {
            bail!("--dry-run needs a question");
        };
        let query = embedder
            .embed_query(question)
            .await
            .context("failed to embed question")?;
        let hits = store
            .search(&query, cli.answer.top_k, cli.program)
            .await
            .context("vector search failed")?;
        println!(
            "--- Retrieved Context ({} chunks) ---\n{}",
            hits.len(),
            render_context(&hits)
        );
        for hit in &hits {
            println!(
                "  {:.4}  {} #{}  {}",
                hit.score,
                hit.chunk.program.slug(),
                hit.chunk.ordinal,
                hit.chunk.section_label()
            );
        }
        println!("dry-run enabled; skipping LLM call.");
        return Ok(());
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
        Arc::new(embedder) as Arc<dyn Embedder>,
        store,
        llm,
        recommender,
        cli.answer.answerer_config(),
    );

    if cli.compare {
        println!("{}", answerer.compare_programs().await);
        return Ok(());
    }
    if cli.admission {
        println!("{}", answerer.admission_info(cli.program).await);
        return Ok(());
    }

    let Some(question) = cli.question else {
        bail!("provide a question, --compare or --admission");
    };
    let mut query = UserQuery::new(question);
    if let Some(background) = cli.background {
        let background = UserBackground {
            background: Some(background),
            ..UserBackground::default()
        };
        query.background = (!background.is_empty()).then_some(background);
    }
    let answer = answerer
        .answer(&query)
        .await
        .context("answer generation failed")?;
    if answer.disposition == Disposition::Rejected {
        println!("--- Rejected ---\n{}", answer.text);
        return Ok(());
    }
    println!("--- Answer ---\n{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\n--- Sources ---");
        for source in &answer.sources {
            println!(
                "  {:.4}  {}  {}",
                source.score,
                source.chunk.program.display_name(),
                source.chunk.section_label()
            );
        }
    }
    Ok(())
}

//! Command-line and environment configuration shared by the binaries.
//!
//! Each binary flattens the groups it needs; every flag can also be set
//! through the environment variable named next to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use url::Url;

use crate::answerer::AnswererConfig;
use crate::bot::PollConfig;
use crate::collector::{CollectTarget, CollectorConfig, DEFAULT_USER_AGENT};
use crate::embedder::{
    EmbedError, OpenAiEmbedder, OpenAiEmbedderConfig, DEFAULT_EMBED_MODEL, DEFAULT_OPENAI_BASE_URL,
};
use crate::llm::{
    AnthropicChat, ChatProvider, LlmError, OpenAiChat, ProviderConfig, DEFAULT_ANTHROPIC_BASE_URL,
    DEFAULT_ANTHROPIC_MODEL, DEFAULT_OPENAI_CHAT_MODEL,
};
use crate::normalizer::NormalizationConfig;
use crate::retry::RetryPolicy;
use crate::store::{JsonlStore, PgVectorStore, StoreError, TableName, VectorStore};
use crate::telegram::{TelegramClient, TelegramError, DEFAULT_API_BASE};

/// Logging output.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Emit JSON log lines instead of human-readable ones
    #[arg(long, env = "ADVISOR_LOG_JSON")]
    pub log_json: bool,
}

/// Where snapshots live.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding per-program snapshot files
    #[arg(long, env = "ADVISOR_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
}

/// Scraper settings.
#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Alternative site root; program pages are resolved as `program/master/<slug>`
    #[arg(long, env = "ADVISOR_BASE_URL")]
    pub base_url: Option<Url>,

    /// User-Agent header sent with page requests
    #[arg(long, env = "ADVISOR_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "ADVISOR_COLLECT_TIMEOUT_SECS", default_value_t = 30)]
    pub collect_timeout_secs: u64,

    /// Attempts per page, including the first
    #[arg(long, env = "ADVISOR_COLLECT_RETRIES", default_value_t = 3)]
    pub collect_retries: usize,

    /// Pause between page fetches in milliseconds
    #[arg(long, env = "ADVISOR_POLITENESS_MS", default_value_t = 250)]
    pub politeness_ms: u64,

    /// Target words per chunk
    #[arg(long, env = "ADVISOR_CHUNK_TOKENS", default_value_t = 120)]
    pub chunk_tokens: usize,

    /// Words shared between consecutive chunks
    #[arg(long, env = "ADVISOR_CHUNK_OVERLAP", default_value_t = 12)]
    pub chunk_overlap: usize,
}

impl CollectArgs {
    /// Collector settings built from the flags.
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.collect_timeout_secs),
            retry: RetryPolicy::with_attempts(self.collect_retries),
            politeness_delay: Duration::from_millis(self.politeness_ms),
            normalization: NormalizationConfig {
                chunk_target_tokens: self.chunk_tokens,
                chunk_overlap_tokens: self.chunk_overlap,
                ..NormalizationConfig::default()
            },
        }
    }

    /// Pages to scrape.
    pub fn targets(&self) -> Result<Vec<CollectTarget>, url::ParseError> {
        CollectTarget::defaults(self.base_url.as_ref())
    }
}

/// Vector store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Local JSONL file.
    Jsonl,
    /// Postgres with the pgvector extension.
    Pgvector,
}

/// Vector store selection.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Which store backs retrieval
    #[arg(
        long = "store",
        env = "ADVISOR_STORE",
        value_enum,
        default_value_t = StoreBackend::Jsonl
    )]
    pub backend: StoreBackend,

    /// JSONL store file
    #[arg(
        long,
        env = "ADVISOR_STORE_PATH",
        default_value = "data/embeddings.jsonl"
    )]
    pub store_path: PathBuf,

    /// Postgres connection string for the pgvector backend
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Postgres schema
    #[arg(long, env = "ADVISOR_PG_SCHEMA", default_value = "public")]
    pub pg_schema: String,

    /// Postgres table
    #[arg(long, env = "ADVISOR_PG_TABLE", default_value = "program_chunks")]
    pub pg_table: String,
}

impl StoreArgs {
    /// Opens the selected backend.
    pub async fn open(&self) -> Result<Arc<dyn VectorStore>, StoreError> {
        match self.backend {
            StoreBackend::Jsonl => Ok(Arc::new(JsonlStore::open(&self.store_path)?)),
            StoreBackend::Pgvector => {
                let url = self
                    .database_url
                    .as_deref()
                    .ok_or_else(|| {
                        StoreError::Config("DATABASE_URL is required for the pgvector store".into())
                    })?;
                let table = TableName::new(&self.pg_schema, &self.pg_table)?;
                Ok(Arc::new(PgVectorStore::connect(url, table).await?))
            }
        }
    }
}

/// Credentials shared by the OpenAI embedder and chat provider.
#[derive(Args, Debug, Clone)]
pub struct OpenAiArgs {
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API root
    #[arg(
        long,
        env = "ADVISOR_OPENAI_BASE_URL",
        default_value = DEFAULT_OPENAI_BASE_URL
    )]
    pub openai_base_url: String,
}

/// Embedding model settings.
#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    /// Embedding model
    #[arg(long, env = "ADVISOR_EMBED_MODEL", default_value = DEFAULT_EMBED_MODEL)]
    pub embed_model: String,

    /// Optional output dimensionality passed to the model
    #[arg(long, env = "ADVISOR_EMBED_DIMENSIONS")]
    pub embed_dimensions: Option<usize>,

    /// Inputs per embeddings request
    #[arg(long, env = "ADVISOR_EMBED_BATCH", default_value_t = 32)]
    pub embed_batch: usize,

    /// Embeddings request timeout in seconds
    #[arg(long, env = "ADVISOR_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    pub embed_timeout_secs: u64,

    /// Attempts per embeddings request, including the first
    #[arg(long, env = "ADVISOR_EMBED_RETRIES", default_value_t = 3)]
    pub embed_retries: usize,
}

impl EmbedArgs {
    /// Builds the embedder.
    pub fn embedder(&self, openai: &OpenAiArgs) -> Result<OpenAiEmbedder, EmbedError> {
        let api_key = openai
            .openai_api_key
            .clone()
            .ok_or_else(|| EmbedError::Config("OPENAI_API_KEY is not set".into()))?;
        OpenAiEmbedder::new(OpenAiEmbedderConfig {
            api_key,
            base_url: openai.openai_base_url.clone(),
            model: self.embed_model.clone(),
            dimensions: self.embed_dimensions,
            timeout: Duration::from_secs(self.embed_timeout_secs),
            retry: RetryPolicy::with_attempts(self.embed_retries),
            batch_size: self.embed_batch,
        })
    }
}

/// Chat model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmBackend {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

/// Chat model settings.
#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Provider used for classification and answers
    #[arg(
        long,
        env = "ADVISOR_LLM_PROVIDER",
        value_enum,
        default_value_t = LlmBackend::Openai
    )]
    pub llm_provider: LlmBackend,

    /// Chat model; defaults to the provider's standard model
    #[arg(long, env = "ADVISOR_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Anthropic API key (required with --llm-provider anthropic)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic API root
    #[arg(
        long,
        env = "ADVISOR_ANTHROPIC_BASE_URL",
        default_value = DEFAULT_ANTHROPIC_BASE_URL
    )]
    pub anthropic_base_url: String,

    /// Chat request timeout in seconds
    #[arg(long, env = "ADVISOR_CHAT_TIMEOUT_SECS", default_value_t = 60)]
    pub chat_timeout_secs: u64,

    /// Attempts per chat request, including the first
    #[arg(long, env = "ADVISOR_CHAT_RETRIES", default_value_t = 3)]
    pub chat_retries: usize,
}

impl ChatArgs {
    /// Builds the selected chat provider.
    pub fn provider(&self, openai: &OpenAiArgs) -> Result<Arc<dyn ChatProvider>, LlmError> {
        let timeout = Duration::from_secs(self.chat_timeout_secs);
        let retry = RetryPolicy::with_attempts(self.chat_retries);
        match self.llm_provider {
            LlmBackend::Openai => {
                let api_key = openai
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| LlmError::Config("OPENAI_API_KEY is not set".into()))?;
                Ok(Arc::new(OpenAiChat::new(ProviderConfig {
                    api_key,
                    base_url: openai.openai_base_url.clone(),
                    model: self
                        .chat_model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OPENAI_CHAT_MODEL.to_string()),
                    timeout,
                    retry,
                })?))
            }
            LlmBackend::Anthropic => {
                let api_key = self
                    .anthropic_api_key
                    .clone()
                    .ok_or_else(|| LlmError::Config("ANTHROPIC_API_KEY is not set".into()))?;
                Ok(Arc::new(AnthropicChat::new(ProviderConfig {
                    api_key,
                    base_url: self.anthropic_base_url.clone(),
                    model: self
                        .chat_model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
                    timeout,
                    retry,
                })?))
            }
        }
    }
}

/// Retrieval and generation tuning.
#[derive(Args, Debug, Clone)]
pub struct AnswerArgs {
    /// Chunks retrieved per question
    #[arg(long, env = "ADVISOR_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Sampling temperature for answers
    #[arg(long, env = "ADVISOR_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    /// Completion token cap for answers
    #[arg(long, env = "ADVISOR_MAX_TOKENS", default_value_t = 1000)]
    pub max_tokens: usize,

    /// Answer every question without the relevance classifier
    #[arg(long, env = "ADVISOR_NO_RELEVANCE_GATE")]
    pub no_relevance_gate: bool,

    /// Return ranked recommendations without LLM enrichment
    #[arg(long, env = "ADVISOR_NO_ENRICH")]
    pub no_enrich: bool,

    /// Query embeddings kept in the LRU cache (0 disables it)
    #[arg(long, env = "ADVISOR_EMBED_CACHE", default_value_t = 256)]
    pub embedding_cache_size: usize,
}

impl AnswerArgs {
    /// Answerer settings built from the flags.
    pub fn answerer_config(&self) -> AnswererConfig {
        AnswererConfig {
            top_k: self.top_k,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            relevance_gate: !self.no_relevance_gate,
            enrich_recommendations: !self.no_enrich,
            embedding_cache_size: self.embedding_cache_size,
        }
    }
}

/// Bot API connection.
#[derive(Args, Debug, Clone)]
pub struct TelegramArgs {
    /// Bot token issued by @BotFather
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Bot API root
    #[arg(
        long,
        env = "ADVISOR_TELEGRAM_API_BASE",
        default_value = DEFAULT_API_BASE
    )]
    pub telegram_api_base: String,

    /// Long-poll timeout in seconds
    #[arg(long, env = "ADVISOR_POLL_TIMEOUT_SECS", default_value_t = 30)]
    pub poll_timeout_secs: u64,
}

impl TelegramArgs {
    /// Bot API client.
    pub fn client(&self) -> Result<TelegramClient, TelegramError> {
        TelegramClient::new(&self.telegram_token, &self.telegram_api_base)
    }

    /// Polling settings.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: Duration::from_secs(self.poll_timeout_secs),
            ..PollConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
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
    }

    #[test]
    fn flattened_groups_do_not_collide() {
        use clap::CommandFactory;
        Harness::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_component_configs() {
        let cli = Harness::try_parse_from([
            "advisor",
            "--store",
            "pgvector",
            "--top-k",
            "3",
            "--no-relevance-gate",
            "--chunk-tokens",
            "64",
            "--collect-retries",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.store.backend, StoreBackend::Pgvector);

        let answer = cli.answer.answerer_config();
        assert_eq!(answer.top_k, 3);
        assert!(!answer.relevance_gate);
        assert!(answer.enrich_recommendations);

        let collector = cli.collect.collector_config();
        assert_eq!(collector.normalization.chunk_target_tokens, 64);
        assert_eq!(collector.retry.max_attempts, 5);
        assert_eq!(cli.collect.targets().unwrap().len(), 2);
    }
}

#![warn(missing_docs)]
//! Program advisor for two ITMO master's programs.
//!
//! The pipeline scrapes the program pages into snapshots, embeds their
//! chunks into a vector store, and answers Telegram questions with
//! retrieval-augmented generation.

pub mod answerer;
pub mod bot;
pub mod collector;
pub mod config;
pub mod embedder;
pub mod indexer;
pub mod llm;
pub mod normalizer;
pub mod profile;
pub mod program;
pub mod prompts;
pub mod recommender;
pub mod retry;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod telegram;
pub mod telemetry;

pub use answerer::{
    Answer, AnswerError, Answerer, AnswererConfig, Disposition, UserBackground, UserQuery,
};
pub use bot::{Bot, PollConfig, Reply};
pub use collector::{CollectError, CollectTarget, Collector, CollectorConfig};
pub use embedder::{EmbedError, Embedder, OpenAiEmbedder};
pub use indexer::{build_index, IndexError, IndexReport};
pub use llm::{AnthropicChat, ChatProvider, ChatRequest, LlmError, OpenAiChat};
pub use normalizer::{
    BlockKind, FetchedPage, NormalizationConfig, NormalizationError, NormalizedChunk,
    NormalizedPage, Normalizer, PageMetadata, SectionHeading, TextBlock,
};
pub use program::{ChunkKind, Course, CourseKind, CurriculumChunk, ProgramId, ProgramProfile};
pub use recommender::{Recommendation, Recommender};
pub use snapshot::ProgramSnapshot;
pub use store::{
    EmbeddingRecord, JsonlStore, PgVectorStore, ScoredRecord, StoreError, TableName, VectorStore,
};
pub use telegram::{TelegramClient, TelegramError};

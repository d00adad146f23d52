//! Retrieval-augmented answering over the indexed program chunks.
//!
//! Every public entry point degrades instead of failing where a sensible
//! fallback exists: retrieval errors become empty context, classifier
//! errors let the question through, and the comparison, admission and
//! recommendation flows fall back to static texts. Only plain question
//! answering surfaces [`AnswerError`], so the front-end can apologise.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::embedder::{EmbedError, Embedder};
use crate::llm::{ChatProvider, ChatRequest, LlmError};
use crate::program::ProgramId;
use crate::prompts;
use crate::recommender::{format_recommendations, Recommender, DEFAULT_MAX_RECOMMENDATIONS};
use crate::store::{ScoredRecord, StoreError, VectorStore};

/// Chunks retrieved for the fallback recommendation prompt.
const FALLBACK_RECOMMENDATION_K: usize = 10;
const PERSONALIZATION_HINT: &str =
    "\nУчитывай эту информацию при ответе, давая персонализированные рекомендации.";

/// What the user has told the bot about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserBackground {
    /// Education and work experience.
    pub background: Option<String>,
    /// Topics of interest.
    pub interests: Vec<String>,
    /// Extra experience notes.
    pub experience: Option<String>,
    /// Program the user leans towards.
    pub preferred_program: Option<ProgramId>,
}

impl UserBackground {
    /// True when no field carries information.
    pub fn is_empty(&self) -> bool {
        non_blank(&self.background).is_none()
            && self.interests.is_empty()
            && non_blank(&self.experience).is_none()
            && self.preferred_program.is_none()
    }

    /// System-prompt suffix describing the user; empty when nothing is known.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut lines = vec!["\n\nИнформация о пользователе:".to_string()];
        if let Some(background) = non_blank(&self.background) {
            lines.push(format!("- Бэкграунд: {background}"));
        }
        if !self.interests.is_empty() {
            lines.push(format!("- Интересы: {}", self.interests.join(", ")));
        }
        if let Some(experience) = non_blank(&self.experience) {
            lines.push(format!("- Опыт: {experience}"));
        }
        if let Some(program) = self.preferred_program {
            lines.push(format!("- Предпочитаемая программа: {}", program.display_name()));
        }
        lines.push(PERSONALIZATION_HINT.to_string());
        lines.join("\n")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A question plus whatever background the user shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    /// Question text.
    pub text: String,
    /// Optional user background.
    pub background: Option<UserBackground>,
}

impl UserQuery {
    /// Query without background.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            background: None,
        }
    }
}

/// Whether the question was answered or turned away by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Generated from retrieved context.
    Answered,
    /// Unrelated to the programs; text is the fixed rejection message.
    Rejected,
}

/// Reply text plus the chunks that informed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Text to send back.
    pub text: String,
    /// Retrieved chunks, best first; empty for rejections.
    pub sources: Vec<ScoredRecord>,
    /// Answered or rejected.
    pub disposition: Disposition,
}

/// Errors surfaced by [`Answerer::answer`].
#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    /// The language model failed to produce an answer.
    #[error("answer generation failed: {0}")]
    Generation(#[source] LlmError),
}

#[derive(Debug, thiserror::Error)]
enum RetrievalError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answerer tuning knobs.
#[derive(Debug, Clone)]
pub struct AnswererConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Temperature for answers.
    pub temperature: f32,
    /// Completion token cap for answers.
    pub max_tokens: usize,
    /// Ask the classifier before answering.
    pub relevance_gate: bool,
    /// Let the model expand ranked recommendations.
    pub enrich_recommendations: bool,
    /// Cached query embeddings (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            temperature: 0.3,
            max_tokens: 1000,
            relevance_gate: true,
            enrich_recommendations: true,
            embedding_cache_size: 256,
        }
    }
}

const AFFIRMATIONS: &[&str] = &["да", "yes"];
const NEGATIONS: &[&str] = &["нет", "no", "не", "not"];

/// Parses the classifier's reply; only an explicit yes counts.
///
/// The reply is relevant when it contains "да"/"yes" or a word starting
/// with "релевант", and no negation appears before that word.
pub fn parse_relevance(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    let words: Vec<&str> = lower
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let Some(verdict) = words
        .iter()
        .position(|word| AFFIRMATIONS.contains(word) || word.starts_with("релевант"))
    else {
        return false;
    };
    !words[..verdict].iter().any(|word| NEGATIONS.contains(word))
}

/// Renders retrieved chunks as prompt context.
pub fn render_context(records: &[ScoredRecord]) -> String {
    if records.is_empty() {
        return prompts::NO_CONTEXT.to_string();
    }
    records
        .iter()
        .map(|record| {
            let chunk = &record.chunk;
            let mut header = format!("[Программа: {}]", chunk.program.display_name());
            if let Some(course) = &chunk.course {
                header.push_str(&format!(" [Курс: {course}]"));
            }
            format!("{header}\n{}", chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// The RAG pipeline: gate, retrieve, prompt, generate.
pub struct Answerer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatProvider>,
    recommender: Recommender,
    config: AnswererConfig,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl Answerer {
    /// Wires the collaborators together.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatProvider>,
        recommender: Recommender,
        config: AnswererConfig,
    ) -> Self {
        let cache = NonZeroUsize::new(config.embedding_cache_size)
            .map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            embedder,
            store,
            llm,
            recommender,
            config,
            cache,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &AnswererConfig {
        &self.config
    }

    /// Asks the classifier whether `question` concerns the programs.
    /// Classifier failures let the question through.
    pub async fn is_relevant(&self, question: &str) -> bool {
        let request = ChatRequest {
            system: prompts::RELEVANCE_PROMPT.to_string(),
            user: question.to_string(),
            temperature: 0.1,
            max_tokens: 100,
        };
        match self.llm.complete(&request).await {
            Ok(reply) => {
                let relevant = parse_relevance(&reply);
                tracing::debug!(relevant, reply = %reply.trim(), "relevance check");
                relevant
            }
            Err(err) => {
                tracing::warn!(error = %err, "relevance check failed, answering anyway");
                true
            }
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        let key = query.trim().to_string();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(&key).cloned() {
                return Ok(hit);
            }
        }
        let embedding = self.embedder.embed_query(&key).await?;
        if let Some(cache) = &self.cache {
            cache.lock().await.put(key, embedding.clone());
        }
        Ok(embedding)
    }

    async fn try_retrieve(
        &self,
        query: &str,
        k: usize,
        program: Option<ProgramId>,
    ) -> Result<Vec<ScoredRecord>, RetrievalError> {
        let embedding = self.embed_query(query).await?;
        let mut hits = self.store.search(&embedding, k, program).await?;
        hits.truncate(k);
        Ok(hits)
    }

    /// At most `k` chunks for `query`; failures yield an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        program: Option<ProgramId>,
    ) -> Vec<ScoredRecord> {
        match self.try_retrieve(query, k, program).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::error!(error = %err, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    async fn generate(
        &self,
        user: String,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        self.llm
            .complete(&ChatRequest {
                system: prompts::SYSTEM_PROMPT.to_string(),
                user,
                temperature,
                max_tokens,
            })
            .await
    }

    /// Answers a question, or rejects it when it is off-topic.
    pub async fn answer(&self, query: &UserQuery) -> Result<Answer, AnswerError> {
        if self.config.relevance_gate && !self.is_relevant(&query.text).await {
            tracing::info!("question rejected as off-topic");
            return Ok(Answer {
                text: prompts::REJECTION_MESSAGE.to_string(),
                sources: Vec::new(),
                disposition: Disposition::Rejected,
            });
        }

        let sources = self.retrieve(&query.text, self.config.top_k, None).await;
        let context = render_context(&sources);
        let user_info = query
            .background
            .as_ref()
            .map(UserBackground::render)
            .unwrap_or_default();
        let request = ChatRequest {
            system: format!("{}{user_info}", prompts::SYSTEM_PROMPT),
            user: prompts::question_prompt(&context, &query.text),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let text = self
            .llm
            .complete(&request)
            .await
            .map_err(AnswerError::Generation)?;
        tracing::info!(
            sources = sources.len(),
            provider = self.llm.name(),
            "answered question"
        );

        Ok(Answer {
            text,
            sources,
            disposition: Disposition::Answered,
        })
    }

    /// Side-by-side comparison of the two programs.
    pub async fn compare_programs(&self) -> String {
        let mut sections = Vec::with_capacity(ProgramId::ALL.len());
        let mut found = 0usize;
        for program in ProgramId::ALL {
            let hits = self
                .retrieve(
                    prompts::comparison_query(program),
                    self.config.top_k,
                    Some(program),
                )
                .await;
            found += hits.len();
            sections.push(format!(
                "Информация о программе \"{}\":\n{}",
                program.display_name(),
                render_context(&hits)
            ));
        }
        if found == 0 {
            return prompts::FALLBACK_COMPARISON.to_string();
        }

        let user = format!(
            "{}\n\n{}",
            sections.join("\n\n---\n\n"),
            prompts::COMPARISON_INSTRUCTION
        );
        match self.generate(user, self.config.temperature, 1500).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "comparison generation failed");
                prompts::FALLBACK_COMPARISON.to_string()
            }
        }
    }

    /// Admission requirements, optionally for one program.
    pub async fn admission_info(&self, program: Option<ProgramId>) -> String {
        let mut query = prompts::ADMISSION_QUERY.to_string();
        if let Some(program) = program {
            query.push(' ');
            query.push_str(program.display_name());
        }
        let hits = self.retrieve(&query, self.config.top_k, program).await;
        if hits.is_empty() {
            return prompts::fallback_admission();
        }
        match self
            .generate(
                prompts::admission_prompt(&render_context(&hits)),
                self.config.temperature,
                1000,
            )
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "admission generation failed");
                prompts::fallback_admission()
            }
        }
    }

    /// Elective recommendations for the user.
    pub async fn recommend_courses(
        &self,
        background: &str,
        interests: &[String],
        program: Option<ProgramId>,
    ) -> String {
        let ranked = self
            .recommender
            .recommend(background, interests, program, DEFAULT_MAX_RECOMMENDATIONS);
        if ranked.is_empty() {
            return self
                .recommend_from_retrieval(background, interests, program)
                .await;
        }

        let base = format_recommendations(&ranked, true);
        if !self.config.enrich_recommendations {
            return base;
        }
        let prompt = prompts::enrich_recommendations_prompt(background, interests, &base);
        match self.generate(prompt, 0.4, 1500).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "recommendation enrichment failed");
                base
            }
        }
    }

    async fn recommend_from_retrieval(
        &self,
        background: &str,
        interests: &[String],
        program: Option<ProgramId>,
    ) -> String {
        let mut query = format!("выборные курсы элективы {}", interests.join(" "));
        if let Some(program) = program {
            query.push_str(" программа ");
            query.push_str(program.display_name());
        }
        let hits = self
            .retrieve(query.trim(), FALLBACK_RECOMMENDATION_K, program)
            .await;
        if hits.is_empty() {
            return prompts::RECOMMENDATIONS_FAILED.to_string();
        }

        let background = if background.trim().is_empty() {
            "Не указан"
        } else {
            background
        };
        let prompt = prompts::retrieval_recommendations_prompt(
            background,
            interests,
            &render_context(&hits),
        );
        match self.generate(prompt, self.config.temperature, 1500).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "fallback recommendations failed");
                prompts::RECOMMENDATIONS_FAILED.to_string()
            }
        }
    }
}

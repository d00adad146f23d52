#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use masters_advisor::profile::extract_profile;
use masters_advisor::prompts;
use masters_advisor::{
    build_index, Answerer, AnswererConfig, ChatProvider, ChatRequest, EmbedError, Embedder,
    FetchedPage, JsonlStore, LlmError, NormalizationConfig, Normalizer, ProgramId, ProgramSnapshot,
    Recommender, VectorStore,
};
use reqwest::header::HeaderMap;
use tempfile::TempDir;
use url::Url;

pub const AI_PAGE: &str = r#"<main>
  <h1>Искусственный интеллект</h1>
  <h2>О программе</h2>
  <p>Программа готовит ML-инженеров: машинное обучение, глубокое обучение и работа с данными в индустриальных проектах.</p>
  <h2>Учебный план</h2>
  <table>
    <tr><th>Дисциплина</th><th>Семестр</th><th>З.е.</th><th>Тип</th></tr>
    <tr><td>Машинное обучение</td><td>1</td><td>6</td><td>Обязательная</td></tr>
    <tr><td>Компьютерное зрение</td><td>2</td><td>4</td><td>Выборная</td></tr>
    <tr><td>NLP и языковые модели</td><td>3</td><td>4</td><td>Выборная</td></tr>
  </table>
  <h2>Как поступить</h2>
  <ul><li>Диплом бакалавра</li><li>Вступительный экзамен по математике</li></ul>
</main>"#;

pub const AI_PRODUCT_PAGE: &str = r#"<main>
  <h1>Управление ИИ-продуктами</h1>
  <h2>О программе</h2>
  <p>Программа для продакт-менеджеров, которые запускают продукты на основе искусственного интеллекта.</p>
  <h2>Учебный план</h2>
  <table>
    <tr><th>Дисциплина</th><th>Семестр</th><th>З.е.</th><th>Тип</th></tr>
    <tr><td>Продуктовая аналитика</td><td>1</td><td>4</td><td>Обязательная</td></tr>
    <tr><td>MLOps для продуктов</td><td>2</td><td>3</td><td>Выборная</td></tr>
  </table>
</main>"#;

/// Snapshot built from inline HTML, as the collector would.
pub fn snapshot(program: ProgramId, html: &str) -> ProgramSnapshot {
    let page = FetchedPage::new(
        Url::parse(program.default_url()).unwrap(),
        SystemTime::now(),
        200,
        HeaderMap::new(),
        html.as_bytes().to_vec(),
    );
    let normalized = Normalizer::new(NormalizationConfig::default())
        .normalize(&page)
        .unwrap();
    ProgramSnapshot {
        program,
        metadata: normalized.metadata.clone(),
        profile: extract_profile(program, &normalized),
        chunks: normalized.chunks,
    }
}

pub fn snapshots() -> Vec<ProgramSnapshot> {
    vec![
        snapshot(ProgramId::Ai, AI_PAGE),
        snapshot(ProgramId::AiProduct, AI_PRODUCT_PAGE),
    ]
}

const VOCABULARY: &[&str] = &[
    "курс", "обучен", "поступ", "экзамен", "продукт", "nlp", "зрение", "mlops", "погод", "программ",
];

/// Bag-of-keywords embedder; the trailing bias keeps vectors non-zero.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|term| lower.matches(term).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(inputs.iter().map(|input| Self::vector(input)).collect())
    }
}

/// Chat provider with canned replies that records every request.
pub struct ScriptedChat {
    relevance: Option<&'static str>,
    answer: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    /// `relevance: None` fails the classifier; `answer: None` fails generation.
    pub fn new(relevance: Option<&'static str>, answer: Option<&'static str>) -> Self {
        Self {
            relevance,
            answer: answer.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Accepts every question and answers with `answer`.
    pub fn answering(answer: String) -> Self {
        Self {
            relevance: Some("да"),
            answer: Some(answer),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = if request.system == prompts::RELEVANCE_PROMPT {
            self.relevance.map(str::to_string)
        } else {
            self.answer.clone()
        };
        reply.ok_or_else(|| LlmError::Status {
            provider: "scripted",
            status: 500,
            body: "scripted failure".into(),
        })
    }
}

/// Answerer over a JSONL store in a temp dir. `indexed` fills the store from
/// [`snapshots`]; `catalog` gives the recommender their courses.
pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<JsonlStore>,
    pub chat: Arc<ScriptedChat>,
    pub answerer: Arc<Answerer>,
}

pub async fn fixture(chat: ScriptedChat, indexed: bool, config: AnswererConfig) -> Fixture {
    fixture_with_catalog(chat, indexed, indexed, config).await
}

pub async fn fixture_with_catalog(
    chat: ScriptedChat,
    indexed: bool,
    catalog: bool,
    config: AnswererConfig,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlStore::open(dir.path().join("embeddings.jsonl")).unwrap());
    let snapshots = snapshots();
    if indexed {
        build_index(&snapshots, &KeywordEmbedder, store.as_ref()).await.unwrap();
    }
    let recommender = if catalog {
        Recommender::from_snapshots(&snapshots)
    } else {
        Recommender::new(Vec::new())
    };
    let chat = Arc::new(chat);
    let answerer = Arc::new(Answerer::new(
        Arc::new(KeywordEmbedder),
        Arc::clone(&store) as Arc<dyn VectorStore>,
        Arc::clone(&chat) as Arc<dyn ChatProvider>,
        recommender,
        config,
    ));
    Fixture {
        dir,
        store,
        chat,
        answerer,
    }
}

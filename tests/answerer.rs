mod common;

use common::{fixture, fixture_with_catalog, ScriptedChat};
use masters_advisor::prompts;
use masters_advisor::{
    AnswerError, AnswererConfig, Disposition, ProgramId, UserBackground, UserQuery, VectorStore,
};
use pretty_assertions::assert_eq;

fn config(top_k: usize) -> AnswererConfig {
    AnswererConfig {
        top_k,
        enrich_recommendations: false,
        ..AnswererConfig::default()
    }
}

#[tokio::test]
async fn off_topic_questions_are_rejected() {
    let chat = ScriptedChat::new(Some("Нет"), Some("не должен звучать"));
    let fx = fixture(chat, true, config(5)).await;

    let answer = fx
        .answerer
        .answer(&UserQuery::new("Какая завтра погода в Петербурге?"))
        .await
        .unwrap();

    assert_eq!(answer.disposition, Disposition::Rejected);
    assert_eq!(answer.text, prompts::REJECTION_MESSAGE);
    assert!(answer.sources.is_empty());
    let requests = fx.chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, prompts::RELEVANCE_PROMPT);
    assert_eq!(requests[0].max_tokens, 100);
}

#[tokio::test]
async fn relevant_questions_use_at_most_k_sources() {
    let chat = ScriptedChat::new(Some("Да"), Some("Есть курс NLP."));
    let fx = fixture(chat, true, config(2)).await;
    assert!(fx.store.len().await.unwrap() > 2);

    let mut query = UserQuery::new("Какие курсы по NLP есть в программе?");
    query.background = Some(UserBackground {
        background: Some("Python-разработчик".into()),
        ..UserBackground::default()
    });
    let answer = fx.answerer.answer(&query).await.unwrap();

    assert_eq!(answer.disposition, Disposition::Answered);
    assert_eq!(answer.text, "Есть курс NLP.");
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.len() <= 2);
    assert!(answer
        .sources
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));

    let requests = fx.chat.requests();
    assert_eq!(requests.len(), 2);
    let generation = &requests[1];
    assert!(generation.system.starts_with(prompts::SYSTEM_PROMPT));
    assert!(generation.system.contains("Бэкграунд: Python-разработчик"));
    assert!(generation.user.contains("[Программа: "));
    assert!(generation.user.contains("Какие курсы по NLP"));
}

#[tokio::test]
async fn classifier_failure_lets_the_question_through() {
    let fx = fixture(ScriptedChat::new(None, Some("Два года.")), true, config(3)).await;

    let answer = fx
        .answerer
        .answer(&UserQuery::new("Сколько длится обучение?"))
        .await
        .unwrap();
    assert_eq!(answer.disposition, Disposition::Answered);
    assert_eq!(answer.text, "Два года.");
}

#[tokio::test]
async fn disabled_gate_skips_the_classifier() {
    let fx = fixture(
        ScriptedChat::new(Some("нет"), Some("Ответ.")),
        true,
        AnswererConfig {
            relevance_gate: false,
            ..config(3)
        },
    )
    .await;

    let answer = fx
        .answerer
        .answer(&UserQuery::new("Что угодно"))
        .await
        .unwrap();
    assert_eq!(answer.disposition, Disposition::Answered);
    assert_eq!(fx.chat.requests().len(), 1);
}

#[tokio::test]
async fn generation_failure_is_an_error() {
    let fx = fixture(ScriptedChat::new(Some("да"), None), true, config(3)).await;

    let err = fx
        .answerer
        .answer(&UserQuery::new("Какие экзамены для поступления?"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnswerError::Generation(_)), "{err}");
}

#[tokio::test]
async fn empty_store_answers_without_context() {
    let chat = ScriptedChat::new(Some("да"), Some("Не знаю."));
    let fx = fixture(chat, false, config(3)).await;

    let answer = fx
        .answerer
        .answer(&UserQuery::new("Какие курсы есть?"))
        .await
        .unwrap();
    assert!(answer.sources.is_empty());
    assert!(fx.chat.requests()[1].user.contains(prompts::NO_CONTEXT));
}

#[tokio::test]
async fn retrieval_filters_by_program() {
    let fx = fixture(ScriptedChat::new(Some("да"), Some("-")), true, config(5)).await;

    let hits = fx
        .answerer
        .retrieve("курсы программы", 50, Some(ProgramId::AiProduct))
        .await;
    assert!(!hits.is_empty());
    let product = ProgramId::AiProduct;
    assert!(hits.iter().all(|hit| hit.chunk.program == product));
    assert!(fx.answerer.retrieve("курсы", 0, None).await.is_empty());
}

#[tokio::test]
async fn comparison_falls_back_without_data() {
    let chat = ScriptedChat::new(Some("да"), Some("Сравнение"));
    let fx = fixture(chat, false, config(3)).await;
    assert_eq!(
        fx.answerer.compare_programs().await,
        prompts::FALLBACK_COMPARISON
    );
    assert!(fx.chat.requests().is_empty());
}

#[tokio::test]
async fn comparison_uses_both_programs() {
    let chat = ScriptedChat::new(Some("да"), Some("Сравнение"));
    let fx = fixture(chat, true, config(3)).await;
    assert_eq!(fx.answerer.compare_programs().await, "Сравнение");

    let requests = fx.chat.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains("Информация о программе \"AI\""));
    assert!(requests[0].user.contains("Информация о программе \"AI Product\""));
}

#[tokio::test]
async fn admission_falls_back_to_static_text() {
    let chat = ScriptedChat::new(Some("да"), Some("Нужен диплом."));
    let fx = fixture(chat, false, config(3)).await;
    assert_eq!(
        fx.answerer.admission_info(None).await,
        prompts::fallback_admission()
    );

    let fx = fixture(ScriptedChat::new(Some("да"), None), true, config(3)).await;
    assert_eq!(
        fx.answerer.admission_info(Some(ProgramId::Ai)).await,
        prompts::fallback_admission()
    );
}

#[tokio::test]
async fn recommendations_rank_scraped_electives() {
    let fx = fixture(ScriptedChat::new(Some("да"), Some("-")), true, config(3)).await;

    let text = fx
        .answerer
        .recommend_courses("python, машинное обучение", &["NLP".to_string()], None)
        .await;
    let nlp = text.find("NLP и языковые модели").unwrap();
    let cv = text.find("Компьютерное зрение").unwrap();
    assert!(nlp < cv, "interest match should rank first:\n{text}");
    assert!(
        !text.contains("Машинное обучение\n"),
        "mandatory courses are not recommended"
    );
    assert!(fx.chat.requests().is_empty());
}

#[tokio::test]
async fn recommendations_without_data_apologise() {
    let fx = fixture(ScriptedChat::new(Some("да"), Some("-")), false, config(3)).await;
    let text = fx.answerer.recommend_courses("", &[], None).await;
    assert_eq!(text, prompts::RECOMMENDATIONS_FAILED);
}

#[tokio::test]
async fn recommendations_come_from_retrieval_without_a_catalog() {
    let fx = fixture_with_catalog(
        ScriptedChat::new(Some("да"), Some("Советую курс NLP и языковые модели.")),
        true,
        false,
        config(3),
    )
    .await;

    let text = fx
        .answerer
        .recommend_courses("", &["NLP".to_string()], None)
        .await;
    assert_eq!(text, "Советую курс NLP и языковые модели.");

    let requests = fx.chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, prompts::SYSTEM_PROMPT);
    assert!(requests[0].user.contains("Бэкграунд: Не указан"));
    assert!(requests[0].user.contains("Интересы: NLP"));
    assert!(requests[0].user.contains("Информация о курсах:\n[Программа: "));
}

#[tokio::test]
async fn enriched_recommendations_build_on_the_ranking() {
    let fx = fixture(
        ScriptedChat::new(Some("да"), Some("Развёрнутый совет")),
        true,
        AnswererConfig {
            enrich_recommendations: true,
            ..config(3)
        },
    )
    .await;

    let text = fx
        .answerer
        .recommend_courses("python", &["NLP".to_string()], None)
        .await;
    assert_eq!(text, "Развёрнутый совет");

    let requests = fx.chat.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains("Базовые рекомендации системы:\n🎯 Рекомендованные курсы:"));
    assert!(requests[0].user.contains("NLP и языковые модели"));
}

#[tokio::test]
async fn failed_enrichment_keeps_the_plain_ranking() {
    let fx = fixture(
        ScriptedChat::new(Some("да"), None),
        true,
        AnswererConfig {
            enrich_recommendations: true,
            ..config(3)
        },
    )
    .await;

    let text = fx
        .answerer
        .recommend_courses("python", &["NLP".to_string()], None)
        .await;
    assert!(text.starts_with("🎯 Рекомендованные курсы:"), "{text}");
    assert!(text.contains("🥇 NLP и языковые модели"));
    assert_eq!(fx.chat.requests().len(), 1);
}

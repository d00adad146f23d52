mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fixture, ScriptedChat};
use masters_advisor::bot::{send_reply, Reply, MENU_ASK, MENU_COMPARE, PROGRAM_UNDECIDED, SKIP_STEP};
use masters_advisor::prompts;
use masters_advisor::session::{DialogState, UserProfile};
use masters_advisor::telegram::{Inbound, ReplyMarkup, MESSAGE_LIMIT};
use masters_advisor::{AnswererConfig, Bot, PollConfig, ProgramId, TelegramClient};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "123:TEST";
const USER: i64 = 42;

async fn make_bot(chat: ScriptedChat) -> (Arc<Bot>, common::Fixture) {
    let fx = fixture(
        chat,
        true,
        AnswererConfig {
            enrich_recommendations: false,
            ..AnswererConfig::default()
        },
    )
    .await;
    (Arc::new(Bot::new(Arc::clone(&fx.answerer))), fx)
}

fn api_path(method_name: &str) -> String {
    format!("/bot{TOKEN}/{method_name}")
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result}))
}

fn sent_messages(requests: &[Request]) -> Vec<Value> {
    requests
        .iter()
        .filter(|request| request.url.path() == api_path("sendMessage"))
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn question_gets_exactly_one_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendChatAction")))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ok(json!({"message_id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ScriptedChat::new(Some("да"), Some("Учебный план включает NLP."));
    let (bot, _fx) = make_bot(chat).await;
    let client = TelegramClient::new(TOKEN, &server.uri()).unwrap();
    bot.process(
        &client,
        Inbound {
            chat_id: 700,
            user_id: USER,
            text: "Какие курсы есть на программе AI?".into(),
        },
    )
    .await
    .unwrap();

    let sent = sent_messages(&server.received_requests().await.unwrap());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], 700);
    assert_eq!(sent[0]["text"], "Учебный план включает NLP.");
    assert!(sent[0].get("reply_markup").is_none());
}

#[tokio::test]
async fn polling_loop_replies_once_and_advances_offset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api_path("getMe")))
        .respond_with(ok(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Advisor",
            "username": "advisor_bot"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("getUpdates")))
        .and(query_param("offset", "0"))
        .respond_with(ok(json!([
            {"update_id": 10, "message": {"message_id": 5, "date": 0,
                "from": {"id": USER, "is_bot": false, "first_name": "Аня"},
                "chat": {"id": 700, "type": "private"}, "text": "/help"}},
            {"update_id": 11, "message": {"message_id": 6, "date": 0,
                "from": {"id": 9, "is_bot": true, "first_name": "other"},
                "chat": {"id": 700, "type": "private"}, "text": "/help"}}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("getUpdates")))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendChatAction")))
        .respond_with(ok(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ok(json!({"message_id": 2})))
        .mount(&server)
        .await;

    let (bot, _fx) = make_bot(ScriptedChat::new(Some("да"), Some("-"))).await;
    let client = TelegramClient::new(TOKEN, &server.uri()).unwrap();
    let poll = PollConfig {
        timeout: Duration::from_secs(1),
        error_backoff: Duration::from_millis(10),
    };
    let shutdown = async {
        loop {
            let requests = server.received_requests().await.unwrap_or_default();
            if !sent_messages(&requests).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), bot.run(client, poll, shutdown))
        .await
        .expect("bot did not shut down")
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent = sent_messages(&requests);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["text"], prompts::HELP);

    let later_offsets: Vec<String> = requests
        .iter()
        .filter(|request| request.url.path() == api_path("getUpdates"))
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == "offset")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|offset| offset != "0")
        .collect();
    assert!(
        later_offsets.iter().all(|offset| offset == "12"),
        "{later_offsets:?}"
    );
}

#[tokio::test]
async fn onboarding_collects_background_then_interests() {
    let (bot, _fx) = make_bot(ScriptedChat::new(Some("да"), Some("-"))).await;

    let start = bot.handle(USER, "/start").await;
    assert_eq!(start.text, prompts::ONBOARDING);
    assert!(matches!(start.markup, Some(ReplyMarkup::Keyboard { .. })));

    let ask = bot.handle(USER, "/recommend").await;
    assert_eq!(ask.markup, Some(ReplyMarkup::remove()));
    assert_eq!(
        bot.sessions().get(USER).await.state,
        DialogState::CollectingBackground
    );

    let interests = bot.handle(USER, "Бэкенд на Python, немного ML").await;
    assert!(matches!(interests.markup, Some(ReplyMarkup::Keyboard { .. })));
    let profile = bot.sessions().get(USER).await;
    assert_eq!(profile.state, DialogState::CollectingInterests);
    assert_eq!(
        profile.background.as_deref(),
        Some("Бэкенд на Python, немного ML")
    );

    let experience = bot.handle(USER, "NLP, MLOps").await;
    assert!(matches!(experience.markup, Some(ReplyMarkup::Keyboard { .. })));
    let profile = bot.sessions().get(USER).await;
    assert_eq!(profile.state, DialogState::CollectingExperience);
    assert_eq!(profile.interests, vec!["NLP", "MLOps"]);

    bot.handle(USER, "Два года пишу сервисы").await;
    assert_eq!(
        bot.sessions().get(USER).await.state,
        DialogState::ChoosingProgram
    );

    bot.handle(USER, PROGRAM_UNDECIDED).await;
    let profile = bot.sessions().get(USER).await;
    assert_eq!(profile.state, DialogState::Ready);
    assert_eq!(profile.experience.as_deref(), Some("Два года пишу сервисы"));
    assert_eq!(profile.preferred_program, None);

    let recommendations = bot.handle(USER, "/recommend").await;
    assert!(recommendations.text.contains("NLP и языковые модели"));
    assert!(recommendations.text.contains("MLOps для продуктов"));

    let shown = bot.handle(USER, "/profile").await;
    assert!(shown.text.contains("Бэкграунд: Бэкенд на Python"));
    assert!(shown.text.contains("Интересы: NLP, MLOps"));
    assert!(shown.text.contains("Опыт: Два года пишу сервисы"));

    bot.handle(USER, "/reset").await;
    assert_eq!(bot.sessions().get(USER).await, UserProfile::default());
}

#[tokio::test]
async fn skipped_steps_stay_empty() {
    let (bot, _fx) = make_bot(ScriptedChat::new(Some("да"), Some("-"))).await;
    bot.handle(USER, "/recommend").await;
    bot.handle(USER, "Студент-математик").await;
    bot.handle(USER, SKIP_STEP).await;
    bot.handle(USER, SKIP_STEP).await;
    bot.handle(USER, PROGRAM_UNDECIDED).await;

    let profile = bot.sessions().get(USER).await;
    assert_eq!(profile.state, DialogState::Ready);
    assert!(profile.interests.is_empty());
    assert!(profile.experience.is_none());
    assert!(profile.preferred_program.is_none());
}

#[tokio::test]
async fn preferred_program_narrows_recommendations() {
    let (bot, fx) = make_bot(ScriptedChat::new(Some("да"), Some("-"))).await;
    bot.handle(USER, "/recommend").await;
    bot.handle(USER, "Аналитик данных").await;
    bot.handle(USER, "MLOps").await;
    bot.handle(USER, SKIP_STEP).await;
    let done = bot.handle(USER, "AI Product").await;
    assert!(matches!(done.markup, Some(ReplyMarkup::Keyboard { .. })));
    assert_eq!(
        bot.sessions().get(USER).await.preferred_program,
        Some(ProgramId::AiProduct)
    );

    let recommendations = bot.handle(USER, "/recommend").await;
    assert!(recommendations.text.contains("MLOps для продуктов"));
    assert!(!recommendations.text.contains("Компьютерное зрение"));

    bot.handle(USER, "Какие курсы по MLOps?").await;
    let generation = fx.chat.requests().pop().unwrap();
    assert!(generation
        .system
        .contains("Предпочитаемая программа: AI Product"));
}

#[tokio::test]
async fn menu_buttons_and_unknown_commands() {
    let (bot, fx) = make_bot(ScriptedChat::new(Some("да"), Some("Таблица сравнения"))).await;

    let comparison = bot.handle(USER, MENU_COMPARE).await;
    assert_eq!(comparison.text, "Таблица сравнения");
    let ask = bot.handle(USER, MENU_ASK).await;
    assert_eq!(ask.markup, Some(ReplyMarkup::remove()));
    assert_eq!(bot.handle(USER, "/weather").await.text, prompts::HELP);
    assert_eq!(fx.chat.requests().len(), 1);
}

#[tokio::test]
async fn question_failures_become_fixed_texts() {
    let (bot, _fx) = make_bot(ScriptedChat::new(Some("нет"), Some("-"))).await;
    let rejected = bot.handle(USER, "Посоветуй рецепт борща").await;
    assert_eq!(rejected.text, prompts::REJECTION_MESSAGE);

    let (bot, _fx) = make_bot(ScriptedChat::new(Some("да"), None)).await;
    let failed = bot.handle(USER, "Сколько длится обучение?").await;
    assert_eq!(failed.text, prompts::GENERATION_FAILED);
}

#[tokio::test]
async fn start_reply_carries_the_menu_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendChatAction")))
        .respond_with(ok(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ok(json!({"message_id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let (bot, _fx) = make_bot(ScriptedChat::new(Some("да"), Some("-"))).await;
    let client = TelegramClient::new(TOKEN, &server.uri()).unwrap();
    bot.process(
        &client,
        Inbound {
            chat_id: 700,
            user_id: USER,
            text: "/start".into(),
        },
    )
    .await
    .unwrap();

    let sent = sent_messages(&server.received_requests().await.unwrap());
    assert_eq!(sent[0]["text"], prompts::ONBOARDING);
    assert_eq!(sent[0]["reply_markup"]["resize_keyboard"], true);
}

fn long_answer() -> String {
    (1..=400)
        .map(|line| format!("Строка {line}: курс и его описание"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn long_answers_are_split_across_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendChatAction")))
        .respond_with(ok(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ok(json!({"message_id": 1})))
        .mount(&server)
        .await;

    let answer = long_answer();
    assert!(answer.chars().count() > MESSAGE_LIMIT);
    let (bot, _fx) = make_bot(ScriptedChat::answering(answer.clone())).await;
    let client = TelegramClient::new(TOKEN, &server.uri()).unwrap();
    bot.process(
        &client,
        Inbound {
            chat_id: 700,
            user_id: USER,
            text: "Какие курсы есть?".into(),
        },
    )
    .await
    .unwrap();

    let sent = sent_messages(&server.received_requests().await.unwrap());
    assert!(sent.len() > 1);
    let parts: Vec<&str> = sent.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert!(parts.iter().all(|p| p.chars().count() <= MESSAGE_LIMIT));
    assert_eq!(parts.join("\n"), answer);
    assert!(sent.iter().all(|m| m.get("reply_markup").is_none()));
}

#[tokio::test]
async fn split_reply_keeps_the_keyboard_on_the_last_part() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ok(json!({"message_id": 1})))
        .mount(&server)
        .await;

    let client = TelegramClient::new(TOKEN, &server.uri()).unwrap();
    let reply = Reply {
        text: long_answer(),
        markup: Some(ReplyMarkup::keyboard(&[&[MENU_ASK]])),
    };
    send_reply(&client, 700, &reply).await.unwrap();

    let sent = sent_messages(&server.received_requests().await.unwrap());
    let (last, earlier) = sent.split_last().unwrap();
    assert!(!earlier.is_empty());
    assert!(earlier.iter().all(|m| m.get("reply_markup").is_none()));
    assert_eq!(last["reply_markup"]["keyboard"][0][0]["text"], MENU_ASK);
}

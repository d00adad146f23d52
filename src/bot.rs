//! Chat front-end: command routing, onboarding dialog and the polling loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::answerer::{Answerer, Disposition, UserQuery};
use crate::program::ProgramId;
use crate::prompts;
use crate::session::{parse_interests, DialogState, SessionStore, UserProfile};
use crate::telegram::{
    split_message, Inbound, ReplyMarkup, TelegramClient, TelegramError, MESSAGE_LIMIT,
};

/// Menu button: compare programs.
pub const MENU_COMPARE: &str = "🎓 Сравнить программы";
/// Menu button: course recommendations.
pub const MENU_RECOMMEND: &str = "📚 Помощь с выбором курсов";
/// Menu button: ask a question.
pub const MENU_ASK: &str = "❓ Задать вопрос";
/// Keyboard button that skips an optional onboarding step.
pub const SKIP_STEP: &str = "Пропустить";
/// Program keyboard button for users who have not decided yet.
pub const PROGRAM_UNDECIDED: &str = "Пока не знаю";

const DEFAULT_INTEREST: &str = "машинное обучение";

fn menu() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&[MENU_COMPARE], &[MENU_RECOMMEND], &[MENU_ASK]])
}

fn interests_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[
        &["Computer Vision", "NLP"],
        &["Deep Learning", "MLOps"],
        &["Reinforcement Learning", "Generative AI"],
        &[SKIP_STEP],
    ])
}

fn skip_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&[SKIP_STEP]])
}

fn program_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&["AI", "AI Product"], &[PROGRAM_UNDECIDED]])
}

fn skipped(text: &str) -> bool {
    text.trim() == SKIP_STEP
}

/// Slash commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/compare`
    Compare,
    /// `/recommend`
    Recommend,
    /// `/profile`
    Profile,
    /// `/reset`
    Reset,
    /// Anything else starting with `/`.
    Unknown,
}

impl Command {
    /// Parses `/cmd` or `/cmd@botname`; `None` for plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        Some(match name.to_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "compare" => Self::Compare,
            "recommend" => Self::Recommend,
            "profile" => Self::Profile,
            "reset" => Self::Reset,
            _ => Self::Unknown,
        })
    }
}

/// One outgoing reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Message text.
    pub text: String,
    /// Keyboard change, if any.
    pub markup: Option<ReplyMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    fn with_markup(text: impl Into<String>, markup: ReplyMarkup) -> Self {
        Self {
            text: text.into(),
            markup: Some(markup),
        }
    }
}

/// Long-polling settings.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// `getUpdates` long-poll timeout.
    pub timeout: Duration,
    /// Pause after a failed poll.
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Conversation logic shared by every message task.
pub struct Bot {
    answerer: Arc<Answerer>,
    sessions: SessionStore,
}

impl Bot {
    /// Bot over `answerer` with an empty session map.
    pub fn new(answerer: Arc<Answerer>) -> Self {
        Self {
            answerer,
            sessions: SessionStore::new(),
        }
    }

    /// Session map, for inspection.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn set_state(&self, user_id: i64, state: DialogState) {
        self.sessions
            .update(user_id, |profile| profile.state = state)
            .await;
    }

    /// Computes the single reply to `text` from `user_id`.
    pub async fn handle(&self, user_id: i64, text: &str) -> Reply {
        if let Some(command) = Command::parse(text) {
            return self.handle_command(user_id, command).await;
        }
        match text.trim() {
            MENU_COMPARE => return self.handle_command(user_id, Command::Compare).await,
            MENU_RECOMMEND => return self.handle_command(user_id, Command::Recommend).await,
            MENU_ASK => {
                return Reply::with_markup(
                    "Задай свой вопрос о программах AI или AI Product:",
                    ReplyMarkup::remove(),
                )
            }
            _ => {}
        }

        let state = self.sessions.get(user_id).await.state;
        match state {
            DialogState::CollectingBackground => {
                let background = text.trim().to_string();
                self.sessions
                    .update(user_id, |profile| {
                        profile.background = Some(background);
                        profile.state = DialogState::CollectingInterests;
                    })
                    .await;
                Reply::with_markup(
                    "Отлично! Теперь расскажи, что тебя интересует в AI?\n\
                     (например: компьютерное зрение, NLP, reinforcement learning, MLOps)",
                    interests_keyboard(),
                )
            }
            DialogState::CollectingInterests => {
                let interests = (!skipped(text)).then(|| parse_interests(text));
                self.sessions
                    .update(user_id, |profile| {
                        if let Some(interests) = interests {
                            profile.interests = interests;
                        }
                        profile.state = DialogState::CollectingExperience;
                    })
                    .await;
                Reply::with_markup(
                    "Есть ли у тебя практический опыт в ML или разработке? \
                     Опиши его в паре предложений.",
                    skip_keyboard(),
                )
            }
            DialogState::CollectingExperience => {
                let experience = (!skipped(text)).then(|| text.trim().to_string());
                self.sessions
                    .update(user_id, |profile| {
                        profile.experience = experience;
                        profile.state = DialogState::ChoosingProgram;
                    })
                    .await;
                Reply::with_markup("Какая программа тебе ближе?", program_keyboard())
            }
            DialogState::ChoosingProgram => {
                let program = text.parse::<ProgramId>().ok();
                self.sessions
                    .update(user_id, |profile| {
                        profile.preferred_program = program;
                        profile.state = DialogState::Ready;
                    })
                    .await;
                Reply::with_markup(
                    "Спасибо! Теперь я могу давать персональные рекомендации.\n\n\
                     Задай вопрос о программах или используй кнопки меню:",
                    menu(),
                )
            }
            DialogState::Start | DialogState::Ready => self.answer_question(user_id, text).await,
        }
    }

    async fn answer_question(&self, user_id: i64, text: &str) -> Reply {
        let profile = self.sessions.get(user_id).await;
        let query = UserQuery {
            text: text.trim().to_string(),
            background: profile.to_background(),
        };
        match self.answerer.answer(&query).await {
            Ok(answer) => {
                if answer.disposition == Disposition::Rejected {
                    tracing::info!(user_id, "rejected off-topic question");
                }
                Reply::text(answer.text)
            }
            Err(err) => {
                tracing::error!(user_id, error = %err, "failed to answer question");
                Reply::text(prompts::GENERATION_FAILED)
            }
        }
    }

    async fn handle_command(&self, user_id: i64, command: Command) -> Reply {
        match command {
            Command::Start => {
                self.set_state(user_id, DialogState::Start).await;
                Reply::with_markup(prompts::ONBOARDING, menu())
            }
            Command::Help | Command::Unknown => Reply::text(prompts::HELP),
            Command::Compare => Reply::text(self.answerer.compare_programs().await),
            Command::Recommend => {
                let profile = self.sessions.get(user_id).await;
                if !profile.is_complete() {
                    self.set_state(user_id, DialogState::CollectingBackground)
                        .await;
                    return Reply::with_markup(
                        "Чтобы дать персональные рекомендации, мне нужно узнать о тебе больше.\n\n\
                         Расскажи о своём бэкграунде (образование, \
                         опыт работы с программированием/ML):",
                        ReplyMarkup::remove(),
                    );
                }
                let background = profile.background.unwrap_or_default();
                let interests = if profile.interests.is_empty() {
                    vec![DEFAULT_INTEREST.to_string()]
                } else {
                    profile.interests
                };
                Reply::text(
                    self.answerer
                        .recommend_courses(&background, &interests, profile.preferred_program)
                        .await,
                )
            }
            Command::Profile => Reply::text(render_profile(&self.sessions.get(user_id).await)),
            Command::Reset => {
                self.sessions.reset(user_id).await;
                Reply::text("✅ Профиль сброшен. Используй /start чтобы начать заново.")
            }
        }
    }

    /// Handles one inbound message end to end: typing indicator, then the
    /// reply.
    pub async fn process(
        &self,
        client: &TelegramClient,
        inbound: Inbound,
    ) -> Result<(), TelegramError> {
        if let Err(err) = client.send_typing(inbound.chat_id).await {
            tracing::debug!(chat_id = inbound.chat_id, error = %err, "typing indicator failed");
        }
        let reply = self.handle(inbound.user_id, &inbound.text).await;
        send_reply(client, inbound.chat_id, &reply).await
    }

    /// Polls Telegram until `shutdown` resolves, spawning one task per
    /// inbound message. In-flight tasks are drained before returning.
    pub async fn run(
        self: Arc<Self>,
        client: TelegramClient,
        poll: PollConfig,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TelegramError> {
        let me = client.get_me().await?;
        tracing::info!(
            username = me.username.as_deref().unwrap_or("unknown"),
            "telegram polling started"
        );

        tokio::pin!(shutdown);
        let mut offset = 0i64;
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "message task panicked");
                    }
                }
                polled = client.get_updates(offset, poll.timeout) => match polled {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(inbound) = update.inbound() else {
                                continue;
                            };
                            let bot = Arc::clone(&self);
                            let client = client.clone();
                            tasks.spawn(async move {
                                let chat_id = inbound.chat_id;
                                if let Err(err) = bot.process(&client, inbound).await {
                                    tracing::warn!(
                                        chat_id,
                                        error = %err,
                                        "failed to deliver reply"
                                    );
                                }
                            });
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "telegram polling error");
                        tokio::time::sleep(poll.error_backoff).await;
                    }
                },
            }
        }

        tracing::info!(
            in_flight = tasks.len(),
            "shutting down, draining message tasks"
        );
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "message task panicked");
            }
        }
        Ok(())
    }
}

/// Sends `reply`, split only when it exceeds Telegram's limit. The keyboard
/// rides on the last part.
pub async fn send_reply(
    client: &TelegramClient,
    chat_id: i64,
    reply: &Reply,
) -> Result<(), TelegramError> {
    let parts = split_message(&reply.text, MESSAGE_LIMIT);
    let last = parts.len().saturating_sub(1);
    for (idx, part) in parts.iter().enumerate() {
        let markup = if idx == last {
            reply.markup.as_ref()
        } else {
            None
        };
        client.send_message(chat_id, part, markup).await?;
    }
    Ok(())
}

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(placeholder)
}

fn render_profile(profile: &UserProfile) -> String {
    let interests = if profile.interests.is_empty() {
        "Не указаны".to_string()
    } else {
        profile.interests.join(", ")
    };
    format!(
        "👤 Твой профиль:\n\n\
         📚 Бэкграунд: {}\n\
         🎯 Интересы: {interests}\n\
         💼 Опыт: {}\n\
         🎓 Предпочитаемая программа: {}\n\n\
         Чтобы обновить профиль, используй /reset и начни заново.",
        or_placeholder(profile.background.as_deref(), "Не указан"),
        or_placeholder(profile.experience.as_deref(), "Не указан"),
        or_placeholder(
            profile.preferred_program.map(|p| p.display_name()),
            "Не выбрана"
        ),
    )
}

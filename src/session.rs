//! Per-user dialog state kept for the lifetime of the bot process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::answerer::UserBackground;
use crate::program::ProgramId;

/// Where a user is in the onboarding dialog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DialogState {
    /// Fresh or just restarted.
    #[default]
    Start,
    /// Next text is the user's background.
    CollectingBackground,
    /// Next text is a list of interests.
    CollectingInterests,
    /// Next text describes hands-on experience.
    CollectingExperience,
    /// Next text names the program the user leans towards.
    ChoosingProgram,
    /// Profile collected; texts are questions.
    Ready,
}

/// What the bot knows about one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Education and work experience, in the user's words.
    pub background: Option<String>,
    /// Topics of interest.
    pub interests: Vec<String>,
    /// Extra experience notes.
    pub experience: Option<String>,
    /// Program the user leans towards.
    pub preferred_program: Option<ProgramId>,
    /// Dialog position.
    pub state: DialogState,
}

impl UserProfile {
    /// Recommendations need at least a background.
    pub fn is_complete(&self) -> bool {
        self.background
            .as_deref()
            .is_some_and(|background| !background.trim().is_empty())
    }

    /// Background handed to the answerer, or `None` when nothing is known.
    pub fn to_background(&self) -> Option<UserBackground> {
        let background = UserBackground {
            background: self.background.clone(),
            interests: self.interests.clone(),
            experience: self.experience.clone(),
            preferred_program: self.preferred_program,
        };
        (!background.is_empty()).then_some(background)
    }
}

/// Splits free text into interests on commas and whitespace.
pub fn parse_interests(text: &str) -> Vec<String> {
    text.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Shared map of user id to profile.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<i64, UserProfile>>>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the user's profile (default when unknown).
    pub async fn get(&self, user_id: i64) -> UserProfile {
        self.inner
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutates the user's profile in place, creating it when missing.
    pub async fn update<R>(&self, user_id: i64, apply: impl FnOnce(&mut UserProfile) -> R) -> R {
        let mut guard = self.inner.lock().await;
        apply(guard.entry(user_id).or_default())
    }

    /// Drops everything known about the user.
    pub async fn reset(&self, user_id: i64) {
        self.inner
            .lock()
            .await
            .insert(user_id, UserProfile::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_interests_on_commas_and_spaces() {
        assert_eq!(
            parse_interests("NLP, MLOps  CV,"),
            vec!["NLP", "MLOps", "CV"]
        );
        assert!(parse_interests(" , ").is_empty());
    }

    #[test]
    fn empty_profile_has_no_background() {
        let mut profile = UserProfile::default();
        assert!(profile.to_background().is_none());
        assert!(!profile.is_complete());

        profile.interests = vec!["NLP".into()];
        assert!(profile.to_background().is_some());
        assert!(!profile.is_complete());
    }

    #[tokio::test]
    async fn updates_are_per_user() {
        let sessions = SessionStore::new();
        sessions
            .update(1, |profile| {
                profile.background = Some("физик".into());
                profile.state = DialogState::Ready;
            })
            .await;

        assert_eq!(sessions.get(1).await.state, DialogState::Ready);
        assert_eq!(sessions.get(2).await, UserProfile::default());

        sessions.reset(1).await;
        assert!(!sessions.get(1).await.is_complete());
    }
}

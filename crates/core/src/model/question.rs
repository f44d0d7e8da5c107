use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{GroupId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt must not be empty")]
    EmptyPrompt,
    #[error("question answer key must not be empty")]
    EmptyAnswerKey,
    #[error("question level must be at least 1, got {0}")]
    InvalidLevel(u32),
    #[error("question must belong to at least one topic group")]
    NoGroups,
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

/// What gets shown to the learner. The scheduler never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionContent {
    pub prompt: String,
    pub options: Vec<String>,
    pub subject: Option<String>,
    pub article_url: Option<String>,
}

impl QuestionContent {
    #[must_use]
    pub fn text_only(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Link to background reading shown after the answer.
    #[must_use]
    pub fn with_article_url(mut self, url: impl Into<String>) -> Self {
        self.article_url = Some(url.into());
        self
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// An immutable question owned by the question store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    groups: Vec<GroupId>,
    level: u32,
    content: QuestionContent,
    answer_key: String,
}

impl Question {
    /// Builds a validated question. Groups are sorted and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for an empty prompt or key, a level below 1,
    /// or a question without groups.
    pub fn new(
        id: QuestionId,
        groups: impl IntoIterator<Item = GroupId>,
        level: u32,
        content: QuestionContent,
        answer_key: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let mut groups: Vec<GroupId> = groups.into_iter().collect();
        groups.sort_unstable();
        groups.dedup();

        let answer_key = answer_key.into();

        if content.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if answer_key.trim().is_empty() {
            return Err(QuestionError::EmptyAnswerKey);
        }
        if level == 0 {
            return Err(QuestionError::InvalidLevel(level));
        }
        if groups.is_empty() {
            return Err(QuestionError::NoGroups);
        }

        Ok(Self {
            id,
            groups,
            level,
            content,
            answer_key,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn content(&self) -> &QuestionContent {
        &self.content
    }

    #[must_use]
    pub fn answer_key(&self) -> &str {
        &self.answer_key
    }

    #[must_use]
    pub fn belongs_to(&self, group: GroupId) -> bool {
        self.groups.binary_search(&group).is_ok()
    }

    /// True when `submitted` matches the answer key exactly.
    #[must_use]
    pub fn is_correct(&self, submitted: Option<&str>) -> bool {
        submitted == Some(self.answer_key.as_str())
    }
}

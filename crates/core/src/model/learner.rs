use serde::{Deserialize, Serialize};

use crate::model::ids::{GroupId, LearnerId};

/// A person receiving questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    pub id: LearnerId,
    pub name: String,
    pub is_paused: bool,
}

impl Learner {
    #[must_use]
    pub fn new(id: LearnerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_paused: false,
        }
    }

    #[must_use]
    pub fn paused(mut self, is_paused: bool) -> Self {
        self.is_paused = is_paused;
        self
    }
}

/// Learner ↔ topic group link carrying the level the learner is working towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub target_level: u32,
}

impl GroupMembership {
    #[must_use]
    pub fn new(group_id: GroupId, target_level: u32) -> Self {
        Self {
            group_id,
            target_level,
        }
    }
}

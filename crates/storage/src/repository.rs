use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerRecord, AnswerState, GroupId, GroupMembership, Learner, LearnerId, Question, QuestionId,
    RecordId, ScheduleSettings,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read access to questions, plus the upsert used by seeding and admin tools.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Questions belonging to any of `groups`, minus `excluding`, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_questions_for_groups(
        &self,
        groups: &[GroupId],
        excluding: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError>;

    /// Questions in `group` with exactly `level`, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_questions_at_level(
        &self,
        group: GroupId,
        level: u32,
    ) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// Fetch several questions at once. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;
}

/// History of scheduled and answered items.
///
/// At most one `NotAnswered` record exists per (question, learner).
#[async_trait]
pub trait AnswerLedger: Send + Sync {
    /// Insert a pending record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a pending record already exists for
    /// the pair, `StorageError::NotFound` if the question or learner is unknown.
    async fn insert_pending(
        &self,
        question: QuestionId,
        learner: LearnerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError>;

    /// Pending records scheduled at or before `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Every record for the pair, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_history(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Every record of the learner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn history_for_learner(&self, learner: LearnerId)
    -> Result<Vec<AnswerRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_pending(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<AnswerRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_record(&self, id: RecordId) -> Result<AnswerRecord, StorageError>;

    /// Move a record forward in its lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown record and
    /// `StorageError::Conflict` if the transition is not allowed.
    async fn mark_state(&self, record: RecordId, state: AnswerState) -> Result<(), StorageError>;

    /// Store the learner's answer and mark the record `Answered`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown record and
    /// `StorageError::Conflict` if it was already answered.
    async fn record_answer(
        &self,
        record: RecordId,
        answer: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Learners and their topic group memberships.
#[async_trait]
pub trait LearnerDirectory: Send + Sync {
    /// Learners that are not paused, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_active_learners(&self) -> Result<Vec<Learner>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError>;

    /// Memberships ascending by group id. Unknown learners have none.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_group_memberships(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<GroupMembership>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the learner cannot be stored.
    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError>;

    /// Add or update one membership.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner is unknown.
    async fn set_membership(
        &self,
        learner: LearnerId,
        membership: GroupMembership,
    ) -> Result<(), StorageError>;
}

/// Single-row store for the schedule settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Fetch the saved settings, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures or invalid persisted values.
    async fn get_settings(&self) -> Result<Option<ScheduleSettings>, StorageError>;

    /// Replace the saved settings.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the settings cannot be stored.
    async fn save_settings(&self, settings: &ScheduleSettings) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct LedgerState {
    last_id: u64,
    records: BTreeMap<RecordId, AnswerRecord>,
}

impl LedgerState {
    fn sorted_by_schedule(mut records: Vec<AnswerRecord>) -> Vec<AnswerRecord> {
        records.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        records
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<BTreeMap<QuestionId, Question>>>,
    learners: Arc<Mutex<BTreeMap<LearnerId, Learner>>>,
    memberships: Arc<Mutex<BTreeMap<LearnerId, BTreeMap<GroupId, u32>>>>,
    ledger: Arc<Mutex<LedgerState>>,
    settings: Arc<Mutex<Option<ScheduleSettings>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionStore for InMemoryRepository {
    async fn list_questions_for_groups(
        &self,
        groups: &[GroupId],
        excluding: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        let excluded: BTreeSet<QuestionId> = excluding.iter().copied().collect();
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|q| !excluded.contains(&q.id()))
            .filter(|q| groups.iter().any(|g| q.belongs_to(*g)))
            .cloned()
            .collect())
    }

    async fn list_questions_at_level(
        &self,
        group: GroupId,
        level: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|q| q.level() == level && q.belongs_to(group))
            .cloned()
            .collect())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }
}

#[async_trait]
impl AnswerLedger for InMemoryRepository {
    async fn insert_pending(
        &self,
        question: QuestionId,
        learner: LearnerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        if !self.questions.lock().map_err(lock_err)?.contains_key(&question)
            || !self.learners.lock().map_err(lock_err)?.contains_key(&learner)
        {
            return Err(StorageError::NotFound);
        }

        // Check and insert under one guard so concurrent writers cannot both pass.
        let mut guard = self.ledger.lock().map_err(lock_err)?;
        let duplicate = guard
            .records
            .values()
            .any(|r| r.is_pending() && r.question_id == question && r.learner_id == learner);
        if duplicate {
            return Err(StorageError::Conflict);
        }

        guard.last_id += 1;
        let id = RecordId::new(guard.last_id);
        guard
            .records
            .insert(id, AnswerRecord::pending(id, question, learner, scheduled_at));
        Ok(id)
    }

    async fn find_due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.ledger.lock().map_err(lock_err)?;
        let due = guard
            .records
            .values()
            .filter(|r| r.learner_id == learner && r.is_due(now))
            .cloned()
            .collect();
        Ok(LedgerState::sorted_by_schedule(due))
    }

    async fn find_history(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.ledger.lock().map_err(lock_err)?;
        let history = guard
            .records
            .values()
            .filter(|r| r.learner_id == learner && r.question_id == question)
            .cloned()
            .collect();
        Ok(LedgerState::sorted_by_schedule(history))
    }

    async fn history_for_learner(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.ledger.lock().map_err(lock_err)?;
        let history = guard
            .records
            .values()
            .filter(|r| r.learner_id == learner)
            .cloned()
            .collect();
        Ok(LedgerState::sorted_by_schedule(history))
    }

    async fn find_pending(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        let guard = self.ledger.lock().map_err(lock_err)?;
        Ok(guard
            .records
            .values()
            .find(|r| r.is_pending() && r.learner_id == learner && r.question_id == question)
            .cloned())
    }

    async fn get_record(&self, id: RecordId) -> Result<AnswerRecord, StorageError> {
        let guard = self.ledger.lock().map_err(lock_err)?;
        guard.records.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn mark_state(&self, record: RecordId, state: AnswerState) -> Result<(), StorageError> {
        let mut guard = self.ledger.lock().map_err(lock_err)?;
        let entry = guard.records.get_mut(&record).ok_or(StorageError::NotFound)?;
        if !entry.state.can_advance_to(state) {
            return Err(StorageError::Conflict);
        }
        entry.state = state;
        Ok(())
    }

    async fn record_answer(
        &self,
        record: RecordId,
        answer: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.ledger.lock().map_err(lock_err)?;
        let entry = guard.records.get_mut(&record).ok_or(StorageError::NotFound)?;
        if !entry.state.can_advance_to(AnswerState::Answered) {
            return Err(StorageError::Conflict);
        }
        entry.state = AnswerState::Answered;
        entry.submitted_answer = Some(answer.to_owned());
        entry.answered_at = Some(answered_at);
        Ok(())
    }
}

#[async_trait]
impl LearnerDirectory for InMemoryRepository {
    async fn list_active_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let guard = self.learners.lock().map_err(lock_err)?;
        Ok(guard.values().filter(|l| !l.is_paused).cloned().collect())
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError> {
        let guard = self.learners.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_group_memberships(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<GroupMembership>, StorageError> {
        let guard = self.memberships.lock().map_err(lock_err)?;
        Ok(guard
            .get(&learner)
            .map(|groups| {
                groups
                    .iter()
                    .map(|(group, target)| GroupMembership::new(*group, *target))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError> {
        let mut guard = self.learners.lock().map_err(lock_err)?;
        guard.insert(learner.id, learner.clone());
        Ok(())
    }

    async fn set_membership(
        &self,
        learner: LearnerId,
        membership: GroupMembership,
    ) -> Result<(), StorageError> {
        if !self.learners.lock().map_err(lock_err)?.contains_key(&learner) {
            return Err(StorageError::NotFound);
        }
        let mut guard = self.memberships.lock().map_err(lock_err)?;
        guard
            .entry(learner)
            .or_default()
            .insert(membership.group_id, membership.target_level);
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn get_settings(&self) -> Result<Option<ScheduleSettings>, StorageError> {
        let guard = self.settings.lock().map_err(lock_err)?;
        Ok(guard.clone())
    }

    async fn save_settings(&self, settings: &ScheduleSettings) -> Result<(), StorageError> {
        let mut guard = self.settings.lock().map_err(lock_err)?;
        *guard = Some(settings.clone());
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionStore>,
    pub ledger: Arc<dyn AnswerLedger>,
    pub learners: Arc<dyn LearnerDirectory>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every contract to clones of one repository.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuestionStore + AnswerLedger + LearnerDirectory + SettingsRepository + Clone + 'static,
    {
        let questions: Arc<dyn QuestionStore> = Arc::new(repo.clone());
        let ledger: Arc<dyn AnswerLedger> = Arc::new(repo.clone());
        let learners: Arc<dyn LearnerDirectory> = Arc::new(repo.clone());
        let settings: Arc<dyn SettingsRepository> = Arc::new(repo);
        Self {
            questions,
            ledger,
            learners,
            settings,
        }
    }
}

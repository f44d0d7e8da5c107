use quiz_core::ModelError;
use quiz_core::model::{
    GroupId, GroupMembership, Learner, LearnerId, Question, QuestionContent, QuestionId,
    ScheduleSettingsDraft,
};
use storage::repository::{LearnerDirectory, QuestionStore, SettingsRepository, Storage};

const DEMO_LEARNER: LearnerId = LearnerId::new(1);

/// (group, level, subject, prompt, options, answer)
const DEMO_QUESTIONS: &[(u64, u32, &str, &str, &[&str], &str)] = &[
    (1, 1, "Rust", "Which keyword declares an immutable binding?", &["let", "mut", "const fn"], "let"),
    (1, 1, "Rust", "What does `Option::None` represent?", &["An error", "No value", "Zero"], "No value"),
    (1, 2, "Rust", "Which trait enables the `?` conversion between error types?", &["From", "Into", "AsRef"], "From"),
    (1, 2, "Rust", "What does `&mut T` guarantee?", &["Shared access", "Exclusive access", "Ownership"], "Exclusive access"),
    (1, 3, "Rust", "Which marker trait allows a value to move between threads?", &["Sync", "Send", "Copy"], "Send"),
    (1, 4, "Rust", "What does `Pin` prevent?", &["Dropping", "Moving", "Cloning"], "Moving"),
    (2, 1, "SQL", "Which clause filters rows before grouping?", &["WHERE", "HAVING", "ORDER BY"], "WHERE"),
    (2, 2, "SQL", "What does a partial index cover?", &["All rows", "Rows matching a predicate", "Only NULLs"], "Rows matching a predicate"),
    (2, 3, "SQL", "Which isolation anomaly does SERIALIZABLE rule out that REPEATABLE READ allows?", &["Dirty read", "Write skew", "Lost update"], "Write skew"),
];

/// What a seed run wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub learner: LearnerId,
    pub questions: usize,
}

/// Write recommended schedule settings, a demo learner in two groups and a
/// small question bank. Existing rows with the same ids are overwritten.
///
/// # Errors
///
/// Returns an error if the demo data is invalid or storage fails.
pub async fn seed_demo(storage: &Storage) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let settings = ScheduleSettingsDraft::recommended()
        .validate()
        .map_err(ModelError::from)?;
    storage.settings.save_settings(&settings).await?;

    storage
        .learners
        .upsert_learner(&Learner::new(DEMO_LEARNER, "demo"))
        .await?;
    storage
        .learners
        .set_membership(DEMO_LEARNER, GroupMembership::new(GroupId::new(1), 3))
        .await?;
    storage
        .learners
        .set_membership(DEMO_LEARNER, GroupMembership::new(GroupId::new(2), 2))
        .await?;

    for (index, (group, level, subject, prompt, options, answer)) in
        DEMO_QUESTIONS.iter().enumerate()
    {
        let id = u64::try_from(index + 1)?;
        let question = Question::new(
            QuestionId::new(id),
            [GroupId::new(*group)],
            *level,
            QuestionContent::text_only(*prompt)
                .with_options(options.iter().copied())
                .with_subject(*subject),
            *answer,
        )
        .map_err(ModelError::from)?;
        storage.questions.upsert_question(&question).await?;
    }

    Ok(SeedSummary {
        learner: DEMO_LEARNER,
        questions: DEMO_QUESTIONS.len(),
    })
}

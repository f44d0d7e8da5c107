use std::sync::Arc;

use chrono::Duration;
use quiz_core::model::{
    GroupId, GroupMembership, Learner, LearnerId, Question, QuestionContent, QuestionId,
    ScheduleSettingsDraft,
};
use quiz_core::time::fixed_now;
use services::{BatchItem, SelectionEngine, SharedRng};
use storage::repository::{AnswerLedger, InMemoryRepository, LearnerDirectory, QuestionStore};

const LEARNER: LearnerId = LearnerId::new(1);

async fn seeded_repo(questions: u64) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.upsert_learner(&Learner::new(LEARNER, "Ada"))
        .await
        .expect("learner");
    repo.set_membership(LEARNER, GroupMembership::new(GroupId::new(1), 3))
        .await
        .expect("membership");
    for id in 1..=questions {
        let question = Question::new(
            QuestionId::new(id),
            [GroupId::new(1)],
            u32::try_from(id % 4 + 1).expect("small level"),
            QuestionContent::text_only(format!("Q{id}")),
            "A",
        )
        .expect("question");
        repo.upsert_question(&question).await.expect("upsert");
    }
    repo
}

fn engine(repo: &InMemoryRepository, seed: u64) -> SelectionEngine {
    SelectionEngine::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        SharedRng::seeded(seed),
    )
}

#[tokio::test]
async fn enough_planned_items_skip_sampling() {
    let repo = seeded_repo(5).await;
    let now = fixed_now();
    for (question, hours) in [(3, 1), (1, 3), (2, 2)] {
        repo.insert_pending(QuestionId::new(question), LEARNER, now - Duration::hours(hours))
            .await
            .expect("pending");
    }
    let settings = ScheduleSettingsDraft::recommended()
        .validate()
        .expect("settings");

    let batch = engine(&repo, 1)
        .next_batch(LEARNER, 2, &settings, now)
        .await
        .expect("batch");

    let questions: Vec<QuestionId> = batch.iter().map(BatchItem::question_id).collect();
    assert_eq!(questions, vec![QuestionId::new(1), QuestionId::new(2)]);
    assert!(batch.iter().all(|item| matches!(item, BatchItem::Planned(_))));
}

#[tokio::test]
async fn planned_item_is_followed_by_other_fresh_questions() {
    let repo = seeded_repo(6).await;
    let now = fixed_now();
    let planned = repo
        .insert_pending(QuestionId::new(2), LEARNER, now - Duration::minutes(5))
        .await
        .expect("pending");
    let settings = ScheduleSettingsDraft::recommended()
        .validate()
        .expect("settings");

    for seed in 0..20 {
        let batch = engine(&repo, seed)
            .next_batch(LEARNER, 3, &settings, now)
            .await
            .expect("batch");

        assert_eq!(batch.len(), 3);
        match &batch[0] {
            BatchItem::Planned(record) => assert_eq!(record.id, planned),
            other => panic!("expected planned item first, got {other:?}"),
        }
        let fresh: Vec<QuestionId> = batch[1..].iter().map(BatchItem::question_id).collect();
        assert!(batch[1..].iter().all(|item| matches!(item, BatchItem::Fresh(_))));
        assert!(!fresh.contains(&QuestionId::new(2)));
        assert_ne!(fresh[0], fresh[1]);
    }
}

#[tokio::test]
async fn small_pools_return_what_is_available() {
    let repo = seeded_repo(2).await;
    let settings = ScheduleSettingsDraft::recommended()
        .validate()
        .expect("settings");

    let batch = engine(&repo, 5)
        .next_batch(LEARNER, 10, &settings, fixed_now())
        .await
        .expect("batch");
    assert_eq!(batch.len(), 2);
}

#[tokio::test]
async fn future_pending_records_are_not_planned_items() {
    let repo = seeded_repo(3).await;
    let now = fixed_now();
    repo.insert_pending(QuestionId::new(1), LEARNER, now + Duration::days(1))
        .await
        .expect("pending");
    let settings = ScheduleSettingsDraft::recommended()
        .validate()
        .expect("settings");

    let batch = engine(&repo, 9)
        .next_batch(LEARNER, 1, &settings, now)
        .await
        .expect("batch");
    assert_eq!(batch.len(), 1);
    assert!(matches!(batch[0], BatchItem::Fresh(_)));
}

use chrono::Duration;
use quiz_core::model::{
    AnswerState, GroupId, GroupMembership, Learner, LearnerId, Question, QuestionContent,
    QuestionId, ScheduleSettingsDraft,
};
use quiz_core::time::fixed_now;
use services::{Clock, QuizServices, SessionError, SharedRng};
use storage::repository::{
    AnswerLedger, LearnerDirectory, QuestionStore, SettingsRepository, Storage,
};

const LEARNER: LearnerId = LearnerId::new(1);

async fn services(db_name: &str) -> QuizServices {
    let storage = Storage::sqlite(&format!("sqlite:file:{db_name}?mode=memory&cache=shared"))
        .await
        .expect("connect sqlite");
    storage
        .learners
        .upsert_learner(&Learner::new(LEARNER, "Ada"))
        .await
        .expect("learner");
    storage
        .learners
        .set_membership(LEARNER, GroupMembership::new(GroupId::new(1), 2))
        .await
        .expect("membership");
    for id in 1..=5 {
        let question = Question::new(
            QuestionId::new(id),
            [GroupId::new(1)],
            1,
            QuestionContent::text_only(format!("Q{id}")).with_options(["A", "B"]),
            "A",
        )
        .expect("question");
        storage
            .questions
            .upsert_question(&question)
            .await
            .expect("upsert");
    }
    storage
        .settings
        .save_settings(
            &ScheduleSettingsDraft::recommended()
                .validate()
                .expect("settings"),
        )
        .await
        .expect("save settings");

    QuizServices::from_storage(storage, Clock::fixed(fixed_now()), SharedRng::seeded(7))
        .await
        .expect("services")
}

#[tokio::test]
async fn session_serves_and_records_answers() {
    let services = services("memdb_session_flow").await;
    let session_loop = services.session_loop();
    let mut session = session_loop
        .start_session(LEARNER, Duration::minutes(10), 3)
        .await
        .expect("start");
    assert_eq!(session.remaining(), 3);

    let mut seen = Vec::new();
    while let Some(prompt) = session_loop
        .next_question(&mut session)
        .await
        .expect("next")
    {
        assert_eq!(prompt.record.question_id, prompt.question.id());
        let answer = if seen.is_empty() { "A" } else { "B" };
        let outcome = session_loop
            .submit_answer(&prompt, answer)
            .await
            .expect("submit");
        assert_eq!(outcome.record.state, AnswerState::Answered);
        assert_eq!(outcome.is_correct, answer == "A");
        seen.push(prompt.question.id());
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(session.served(), 3);

    let history = services
        .storage()
        .ledger
        .history_for_learner(LEARNER)
        .await
        .expect("history");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.state == AnswerState::Answered));
}

#[tokio::test]
async fn answering_twice_is_rejected() {
    let services = services("memdb_session_twice").await;
    let session_loop = services.session_loop();
    let mut session = session_loop
        .start_session(LEARNER, Duration::minutes(1), 1)
        .await
        .expect("start");
    let prompt = session_loop
        .next_question(&mut session)
        .await
        .expect("next")
        .expect("one prompt");

    session_loop
        .submit_answer(&prompt, "A")
        .await
        .expect("first answer");
    let err = session_loop.submit_answer(&prompt, "A").await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(_)));
}

#[tokio::test]
async fn invalid_limits_are_rejected() {
    let services = services("memdb_session_limits").await;
    let session_loop = services.session_loop();

    let err = session_loop
        .start_session(LEARNER, Duration::minutes(1), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidMaxCount));

    let err = session_loop
        .start_session(LEARNER, Duration::seconds(-5), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidMaxTime));
}

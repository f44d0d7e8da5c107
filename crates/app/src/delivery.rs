use async_trait::async_trait;
use quiz_core::model::{Learner, Question};
use services::{DeliveryChannel, DeliveryError};

/// Delivery channel that writes each question to the log.
///
/// Stands in for a chat transport when running the dispatcher locally.
pub struct LogDelivery;

#[async_trait]
impl DeliveryChannel for LogDelivery {
    async fn deliver(&self, learner: &Learner, question: &Question) -> Result<(), DeliveryError> {
        let content = question.content();
        tracing::info!(
            learner = %learner.name,
            question_id = %question.id(),
            level = question.level(),
            subject = content.subject.as_deref().unwrap_or("-"),
            prompt = %content.prompt,
            options = %content.options.join(" | "),
            "question for learner"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{GroupId, LearnerId, QuestionContent, QuestionId};

    #[tokio::test]
    async fn log_delivery_always_succeeds() {
        let question = Question::new(
            QuestionId::new(1),
            [GroupId::new(1)],
            1,
            QuestionContent::text_only("Capital of France?").with_options(["Paris", "Rome"]),
            "Paris",
        )
        .unwrap();
        let learner = Learner::new(LearnerId::new(1), "Ada");
        assert!(LogDelivery.deliver(&learner, &question).await.is_ok());
    }
}

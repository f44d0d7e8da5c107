use async_trait::async_trait;
use quiz_core::model::{Learner, Question};

use crate::error::DeliveryError;

/// Transport that puts a question in front of a learner.
///
/// Implementations must be safe to call from the dispatch task. The scheduler
/// bounds every call with the configured delivery timeout.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// # Errors
    ///
    /// Returns `DeliveryError` if the question could not be handed over.
    async fn deliver(&self, learner: &Learner, question: &Question) -> Result<(), DeliveryError>;
}

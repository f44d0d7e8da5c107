mod session;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use session::QuizSession;
pub use workflow::{AnswerOutcome, SessionLoopService, SessionPrompt};

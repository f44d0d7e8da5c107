#![forbid(unsafe_code)]

pub mod app_services;
pub mod dispatch;
pub mod error;
pub mod mastery_service;
mod pending;
pub mod planner;
pub mod rng;
pub mod selection;
pub mod sessions;
pub mod settings_service;

pub use quiz_core::Clock;
pub use sessions as session;

pub use app_services::QuizServices;
pub use dispatch::{
    DeliveryChannel, DispatchHandle, DispatchScheduler, GateDecision, RoundReport, TickOutcome,
};
pub use error::{
    AppServicesError, DeliveryError, DispatchError, PlannerError, SelectionError, SessionError,
    SettingsServiceError,
};
pub use mastery_service::MasteryEstimator;
pub use planner::RepetitionPlanner;
pub use rng::SharedRng;
pub use selection::{BatchItem, SelectionEngine};
pub use sessions::{AnswerOutcome, QuizSession, SessionLoopService, SessionPrompt};
pub use settings_service::SettingsService;

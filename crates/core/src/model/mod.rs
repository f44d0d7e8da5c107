mod answer;
mod ids;
mod learner;
mod question;
mod settings;

pub use ids::{GroupId, LearnerId, ParseIdError, QuestionId, RecordId};

pub use answer::{AnswerRecord, AnswerState};
pub use learner::{GroupMembership, Learner};
pub use question::{Question, QuestionContent, QuestionError};
pub use settings::{
    DispatchOrder, DistributionFunction, ScheduleSettings, ScheduleSettingsDraft, SettingsError,
    TimeWindow,
};

//! Background loop that gates and dispatches questions to learners.

mod delivery;
mod gates;
mod runner;

pub use delivery::DeliveryChannel;
pub use gates::{GateDecision, GateState};
pub use runner::{DispatchHandle, DispatchScheduler, RoundReport, TickOutcome};

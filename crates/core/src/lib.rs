#![forbid(unsafe_code)]

pub mod error;
pub mod mastery;
pub mod model;
pub mod sampling;
pub mod time;
pub mod weighting;

pub use error::ModelError;
pub use time::Clock;

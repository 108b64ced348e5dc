pub mod cache;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod pattern;
pub mod view;

pub use engine::{MatchOutcome, PatternMatcher, Registration, RegistrationStatus};

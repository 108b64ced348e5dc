pub mod backend;
pub mod engine;
pub mod error;
pub mod learning;
pub mod openai_compatible;
pub mod reliability;
pub mod simulated;

pub use backend::{ReasoningBackend, ReasoningQuery, Resolution};
pub use engine::{Deliberation, DeliberationFailure, Deliberator, DeliberatorConfig};

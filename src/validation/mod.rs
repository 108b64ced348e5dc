pub mod authorization;
pub mod engine;
pub mod error;
pub mod rate_limit;
pub mod rules;
pub mod types;

pub use engine::Validator;

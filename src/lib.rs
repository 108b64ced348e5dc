pub mod cli;
pub mod config;
pub mod deliberator;
pub mod logging;
pub mod matcher;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod server;
pub mod shared;
pub mod types;
pub mod validation;

pub mod agent;
pub mod error;
pub mod network;
pub mod tracker;

pub use agent::{Agent, AgentReport, AgentSettings, FallbackPolicy};
pub use network::{AgentBlueprint, AgentNetwork, NetworkReport};
pub use tracker::{CostRecord, CostSummary, CostTracker, LayerBreakdown};

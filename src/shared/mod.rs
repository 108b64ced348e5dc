pub mod error;
pub mod memory;
pub mod ports;
pub mod types;

pub use memory::InMemorySharedState;
pub use ports::SharedStateBackend;

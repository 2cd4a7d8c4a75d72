pub mod compaction;
pub mod energy;
pub mod executor;
pub mod handler;
pub mod key;
pub mod registration;

pub use compaction::LtmCompactor;
pub use energy::EnergyExecutor;
pub use executor::CapabilityExecutor;
pub use handler::{TaskAck, TaskHandler};
pub use key::ltm_key;
pub use registration::register_with_supervisor;

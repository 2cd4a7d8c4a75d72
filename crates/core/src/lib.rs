pub mod capability;
pub mod config;
pub mod error;
pub mod paths;
pub mod protocol;

pub use capability::Capability;
pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use protocol::{
    iso_now, CompletionMessage, Priority, Task, TaskMessage, TaskParameters, TaskStatus,
};

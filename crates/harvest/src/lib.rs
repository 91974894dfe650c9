pub mod assertion;
pub mod config;
pub mod error;
pub mod executor;
pub mod report;
pub mod service;

pub use assertion::PathAssertion;
pub use config::{AssertPath, Config, ConfigBuilder, SubjectDefinition, Task};
pub use error::HarvestError;
pub use executor::Executor;
pub use report::{AssertionRecord, ExecutionReport, GraphAdditionRecord, TaskReport};
pub use service::Service;

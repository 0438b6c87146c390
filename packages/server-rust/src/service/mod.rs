//! Unit plumbing: operation descriptors, argument adaptation, the unit
//! registry and loader, and server settings.

pub mod adapter;
pub mod config;
pub mod operation;
pub mod registry;

pub use adapter::adapt_arguments;
pub use config::ServerConfig;
pub use operation::{OperationDescriptor, UnitError};
pub use registry::{LoadReport, Unit, UnitDeps, UnitLoader, UnitRegistry};

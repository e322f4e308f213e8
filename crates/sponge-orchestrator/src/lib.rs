#![warn(clippy::pedantic)]

pub mod any_first;
pub mod orchestrator;
pub mod registry;

pub use any_first::{any_first, any_first_stream};
pub use orchestrator::Orchestrator;
pub use registry::Registry;

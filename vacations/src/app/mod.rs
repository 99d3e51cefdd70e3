//! Application assembly and lifecycle.

pub mod bootstrap;
pub mod lifecycle;
pub mod pipelines;

pub use bootstrap::{assemble, build_application};
pub use lifecycle::Application;
pub use pipelines::{Dependencies, NamedTask, Pipelines};
